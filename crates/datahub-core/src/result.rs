//! Convenience result type alias for DataHub.

use crate::error::AppError;

/// A specialized `Result` type for DataHub operations.
pub type AppResult<T> = Result<T, AppError>;
