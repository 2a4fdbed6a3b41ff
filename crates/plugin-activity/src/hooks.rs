//! Hook implementations for the activity plugin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use datahub_core::AppResult;
use datahub_plugin::context::{CallContext, Payload};
use datahub_plugin::hooks::{HookAction, HookEvent, HookHandler};

use crate::stream::{ActivityStream, ActivityType};

/// Records an activity for every dataset create, update, and delete.
///
/// Adds the new activity's id to the payload as `activity_id` so later
/// observers can link to it.
#[derive(Debug)]
pub struct DatasetActivityHook {
    stream: Arc<ActivityStream>,
}

impl DatasetActivityHook {
    /// Creates the hook over a stream.
    pub fn new(stream: Arc<ActivityStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl HookHandler for DatasetActivityHook {
    async fn handle(
        &self,
        ctx: &mut CallContext,
        event: &HookEvent,
        payload: &Payload,
    ) -> AppResult<HookAction> {
        let Some(activity_type) = ActivityType::from_event(&event.name) else {
            return Ok(HookAction::Continue);
        };

        let Some(object_id) = payload.get("id").and_then(Value::as_str) else {
            warn!(
                event = %event.name,
                request_id = %event.request_id,
                "Dataset event without id, no activity recorded"
            );
            return Ok(HookAction::Continue);
        };

        let activity = self
            .stream
            .record(
                object_id,
                ctx.actor(),
                activity_type,
                Value::Object(payload.clone()),
            )
            .await;

        debug!(
            object_id = %object_id,
            activity_id = %activity.id,
            actor = ?ctx.actor(),
            "Activity recorded"
        );

        let mut next = payload.clone();
        next.insert("activity_id".to_string(), json!(activity.id));
        Ok(HookAction::ContinueWith(next))
    }
}
