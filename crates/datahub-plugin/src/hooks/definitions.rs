//! Hook point definitions and the values exchanged with hook handlers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Payload;

/// A family of lifecycle events a plugin can observe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Server start and shutdown.
    ServerLifecycle,
    /// Dataset create/update/delete.
    Dataset,
    /// Resource create/update/delete.
    Resource,
    /// Group create/update/delete.
    Group,
    /// Organization create/update/delete.
    Organization,
    /// User create/update/delete.
    User,
    /// Fired before a record is sent to the search index.
    SearchIndex,
    /// A family defined by the host or another plugin.
    Custom(String),
}

impl HookPoint {
    /// Returns the configuration name of this hook point.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerLifecycle => "server_lifecycle",
            Self::Dataset => "dataset",
            Self::Resource => "resource",
            Self::Group => "group",
            Self::Organization => "organization",
            Self::User => "user",
            Self::SearchIndex => "search_index",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for HookPoint {
    fn from(name: &str) -> Self {
        match name {
            "server_lifecycle" => Self::ServerLifecycle,
            "dataset" => Self::Dataset,
            "resource" => Self::Resource,
            "group" => Self::Group,
            "organization" => Self::Organization,
            "user" => Self::User,
            "search_index" => Self::SearchIndex,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event names shared by the built-in hook points.
pub mod events {
    /// Server finished booting.
    pub const SERVER_START: &str = "on_server_start";
    /// Server is shutting down.
    pub const SERVER_SHUTDOWN: &str = "on_server_shutdown";
    /// An object was created.
    pub const AFTER_CREATE: &str = "after_create";
    /// An object was updated.
    pub const AFTER_UPDATE: &str = "after_update";
    /// An object was deleted.
    pub const AFTER_DELETE: &str = "after_delete";
    /// An object is about to be indexed.
    pub const BEFORE_INDEX: &str = "before_index";
}

/// Metadata describing one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// The hook point being notified.
    pub point: HookPoint,
    /// Event name within the family.
    pub name: String,
    /// Request that triggered the notification.
    pub request_id: Uuid,
    /// The acting user, if any.
    pub actor: Option<String>,
    /// When the notification started.
    pub timestamp: DateTime<Utc>,
}

impl HookEvent {
    /// Creates a new hook event.
    pub fn new(point: HookPoint, name: &str, request_id: Uuid) -> Self {
        Self {
            point,
            name: name.to_string(),
            request_id,
            actor: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the acting user.
    pub fn with_actor(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    /// Returns whether this event has the given name.
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

/// What a hook handler tells the dispatcher to do next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HookAction {
    /// Pass the payload through untouched.
    Continue,
    /// Replace the payload seen by the next handler and the caller.
    ContinueWith(Payload),
    /// Stop the notification; the caller receives a hook failure.
    Abort {
        /// Reason for aborting.
        reason: String,
    },
}

impl HookAction {
    /// Creates an abort action.
    pub fn abort(reason: &str) -> Self {
        Self::Abort {
            reason: reason.to_string(),
        }
    }
}
