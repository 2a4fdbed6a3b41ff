//! Hook dispatcher: notifies subscribers of one hook point in order.
//!
//! - Handlers run one after another in the hook point's configured order.
//! - `ContinueWith` replaces the payload seen by later handlers and returned
//!   to the caller; `Continue` passes it through untouched.
//! - `Abort` or an `Err` stops the notification immediately. Remaining
//!   handlers are not invoked and the error reaches the caller.
//!
//! Notifications are never retried; a handler runs inside whatever
//! transaction the triggering action holds.

use tracing::{debug, info, warn};

use datahub_core::{AppError, AppResult};

use super::definitions::{HookAction, HookEvent, HookPoint};
use super::registry::HookRegistry;
use crate::context::{CallContext, Payload};

/// Dispatches notifications to subscribed hook handlers.
#[derive(Debug, Default)]
pub struct HookDispatcher {
    /// Subscription table.
    registry: HookRegistry,
}

impl HookDispatcher {
    /// Creates a dispatcher over a fully built subscription table.
    pub fn new(registry: HookRegistry) -> Self {
        Self { registry }
    }

    /// Notifies every subscriber of `point` about `event`.
    ///
    /// Returns the payload as left by the last handler.
    pub async fn notify(
        &self,
        ctx: &mut CallContext,
        point: &HookPoint,
        event: &str,
        payload: Payload,
    ) -> AppResult<Payload> {
        let subscribers = self.registry.subscribers(point);
        if subscribers.is_empty() {
            return Ok(payload);
        }

        let event = HookEvent::new(point.clone(), event, ctx.request_id()).with_actor(ctx.actor());

        debug!(
            hook = %point,
            event = %event.name,
            request_id = %event.request_id,
            handler_count = subscribers.len(),
            "Notifying hook subscribers"
        );

        let mut payload = payload;
        for subscription in &subscribers {
            ctx.check_cancelled()?;

            let action = match subscription.handler.handle(ctx, &event, &payload).await {
                Ok(action) => action,
                Err(e) => {
                    warn!(
                        hook = %point,
                        event = %event.name,
                        plugin_id = %subscription.plugin,
                        error = %e,
                        "Hook handler failed, aborting notification"
                    );
                    return Err(e);
                }
            };

            match action {
                HookAction::Continue => {}
                HookAction::ContinueWith(next) => {
                    debug!(
                        hook = %point,
                        event = %event.name,
                        plugin_id = %subscription.plugin,
                        "Hook handler replaced payload"
                    );
                    payload = next;
                }
                HookAction::Abort { reason } => {
                    info!(
                        hook = %point,
                        event = %event.name,
                        plugin_id = %subscription.plugin,
                        reason = %reason,
                        "Hook handler aborted notification"
                    );
                    return Err(AppError::hook_failure(format!(
                        "Hook '{}.{}' aborted by plugin '{}': {}",
                        point, event.name, subscription.plugin, reason
                    )));
                }
            }
        }

        Ok(payload)
    }

    /// Returns a reference to the subscription table.
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }
}
