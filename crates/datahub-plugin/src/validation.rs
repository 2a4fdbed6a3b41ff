//! Payload validation seam.
//!
//! Schema conversion and validation live outside the dispatch core. A
//! validator registered for an action normalizes the payload before the
//! chain runs; its errors reach the caller unmodified.

use async_trait::async_trait;

use datahub_core::AppResult;

use crate::context::{CallContext, Payload};

/// Normalizes and validates the payload of one action.
#[async_trait]
pub trait PayloadValidator: Send + Sync + std::fmt::Debug {
    /// Returns the normalized payload or a validation error.
    async fn validate(&self, ctx: &CallContext, payload: Payload) -> AppResult<Payload>;
}
