//! Unified application error types for DataHub.
//!
//! Every layer of the dispatch core (registries, chain links, hooks, the
//! authorization gate) reports failures as an [`AppError`] so they can be
//! propagated with the `?` operator and translated by the outer HTTP or CLI
//! layer without knowing which plugin raised them.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A named entity (plugin, record) was not found.
    NotFound,
    /// No terminal implementation could be resolved for an operation name.
    UnknownOperation,
    /// The authorization gate denied the operation.
    Authorization,
    /// Input validation failed.
    Validation,
    /// A conflict occurred (duplicate entry, concurrent modification, etc.).
    Conflict,
    /// A lifecycle hook deliberately aborted a notification.
    HookFailure,
    /// The caller cancelled the operation while it was in flight.
    Cancelled,
    /// An internal error occurred.
    Internal,
    /// A configuration error occurred.
    Configuration,
    /// A plugin error occurred.
    Plugin,
    /// A serialization/deserialization error occurred.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::UnknownOperation => write!(f, "UNKNOWN_OPERATION"),
            Self::Authorization => write!(f, "NOT_AUTHORIZED"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::HookFailure => write!(f, "HOOK_FAILURE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Plugin => write!(f, "PLUGIN"),
            Self::Serialization => write!(f, "SERIALIZATION"),
        }
    }
}

/// The unified application error used throughout DataHub.
///
/// Plugin-specific failures are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. For [`ErrorKind::Authorization`] the
/// message is the denial reason and is the only text the core ever
/// prepares for an end user.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an unknown-operation error for `name` in `namespace`.
    pub fn unknown_operation(namespace: &str, name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperation,
            format!("Unknown {namespace} operation '{name}'"),
        )
    }

    /// Create a not-authorized error carrying the denial reason.
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, reason)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a hook-failure error.
    pub fn hook_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookFailure, message)
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a plugin error.
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, message)
    }

    /// Returns whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
