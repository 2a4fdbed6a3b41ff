//! # datahub-core
//!
//! Core crate for DataHub. Contains the configuration schemas and the
//! unified error system shared by the dispatch core and its plugins.
//!
//! This crate has **no** internal dependencies on other DataHub crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
