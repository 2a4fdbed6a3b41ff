//! Actions, auth rules, and validators contributed by the activity plugin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use datahub_core::{AppError, AppResult};
use datahub_plugin::actions::{Action, ActionLink, Next};
use datahub_plugin::auth::{AuthDecision, AuthRule};
use datahub_plugin::context::{CallContext, Payload};
use datahub_plugin::validation::PayloadValidator;

use crate::stream::ActivityStream;

/// Name of the listing action.
pub const ACTIVITY_LIST: &str = "activity_list";

/// Name of the dataset read action this plugin extends.
pub const PACKAGE_SHOW: &str = "package_show";

/// Page size when the caller gives none.
pub const DEFAULT_LIMIT: u64 = 31;

/// Largest page size a caller may ask for.
pub const MAX_LIMIT: u64 = 100;

/// Lists the activities of one dataset, newest first.
#[derive(Debug)]
pub struct ActivityList {
    stream: Arc<ActivityStream>,
}

impl ActivityList {
    /// Creates the action over a stream.
    pub fn new(stream: Arc<ActivityStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Action for ActivityList {
    async fn call(&self, _ctx: &mut CallContext, payload: Payload) -> AppResult<Value> {
        let id = required_id(&payload)?;
        let limit = payload
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LIMIT);
        let offset = payload.get("offset").and_then(Value::as_u64).unwrap_or(0);
        let include_hidden = include_hidden(&payload);

        let activities = self
            .stream
            .list(
                id,
                usize::try_from(limit).unwrap_or(usize::MAX),
                usize::try_from(offset).unwrap_or(usize::MAX),
                include_hidden,
            )
            .await;
        Ok(serde_json::to_value(activities)?)
    }

    fn side_effect_free(&self) -> bool {
        true
    }
}

/// Adds `activity_count` to the dataset returned by `package_show`.
#[derive(Debug)]
pub struct PackageShowActivityCount {
    stream: Arc<ActivityStream>,
}

impl PackageShowActivityCount {
    /// Creates the link over a stream.
    pub fn new(stream: Arc<ActivityStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl ActionLink for PackageShowActivityCount {
    async fn call(
        &self,
        ctx: &mut CallContext,
        payload: Payload,
        next: Next<'_>,
    ) -> AppResult<Value> {
        let mut dataset = next.run(ctx, payload).await?;

        let id = dataset.get("id").and_then(Value::as_str).map(str::to_string);
        if let (Some(id), Some(obj)) = (id, dataset.as_object_mut()) {
            let count = self.stream.count(&id).await;
            obj.insert("activity_count".to_string(), json!(count));
        }

        Ok(dataset)
    }
}

/// Anyone may read activity streams; hidden activity is for sysadmins.
#[derive(Debug)]
pub struct ActivityListAuth;

#[async_trait]
impl AuthRule for ActivityListAuth {
    async fn check(&self, _ctx: &mut CallContext, payload: &Payload) -> AppResult<AuthDecision> {
        if include_hidden(payload) {
            return Ok(AuthDecision::deny(
                "Only sysadmins may view hidden activity",
            ));
        }
        Ok(AuthDecision::allow())
    }

    fn allow_anonymous(&self) -> bool {
        true
    }
}

/// Normalizes `activity_list` input: `id` is required and `limit` is
/// defaulted and capped.
#[derive(Debug)]
pub struct ActivityListValidator;

#[async_trait]
impl PayloadValidator for ActivityListValidator {
    async fn validate(&self, _ctx: &CallContext, payload: Payload) -> AppResult<Payload> {
        let mut payload = payload;
        required_id(&payload)?;

        let limit = match payload.get("limit") {
            None | Some(Value::Null) => DEFAULT_LIMIT,
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => n.min(MAX_LIMIT),
                _ => {
                    return Err(AppError::validation(
                        "limit: Must be a positive integer",
                    ));
                }
            },
        };
        payload.insert("limit".to_string(), json!(limit));

        if let Some(offset) = payload.get("offset") {
            if offset.as_u64().is_none() {
                return Err(AppError::validation(
                    "offset: Must be a natural number",
                ));
            }
        }

        Ok(payload)
    }
}

fn required_id(payload: &Payload) -> AppResult<&str> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation("id: Missing value"))
}

fn include_hidden(payload: &Payload) -> bool {
    payload
        .get("include_hidden_activity")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
