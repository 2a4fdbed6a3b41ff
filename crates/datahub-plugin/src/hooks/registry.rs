//! Hook registry: plugins subscribe handlers to hook points in load order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use datahub_core::AppResult;
use datahub_core::config::HookOrder;

use super::definitions::{HookAction, HookEvent, HookPoint};
use crate::context::{CallContext, Payload};

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles one notification.
    ///
    /// Changes to `ctx` are visible to later handlers and to the code that
    /// called `notify`. Returning `Err` stops the notification and hands the
    /// error to that caller unchanged.
    async fn handle(
        &self,
        ctx: &mut CallContext,
        event: &HookEvent,
        payload: &Payload,
    ) -> AppResult<HookAction>;
}

/// A handler subscribed by one plugin.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Plugin that subscribed.
    pub plugin: String,
    /// Load order of that plugin.
    pub load_order: u32,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
}

/// Registry of hook subscriptions organized by hook point.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// Hook point → subscriptions sorted by ascending load order.
    subscriptions: HashMap<HookPoint, Vec<Subscription>>,
    /// Hook point → notification order, when not the default.
    orders: HashMap<HookPoint, HookOrder>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to a hook point.
    pub fn subscribe(
        &mut self,
        plugin: &str,
        load_order: u32,
        hook: HookPoint,
        handler: Arc<dyn HookHandler>,
    ) {
        let entries = self.subscriptions.entry(hook.clone()).or_default();
        entries.push(Subscription {
            plugin: plugin.to_string(),
            load_order,
            handler,
        });
        entries.sort_by_key(|s| s.load_order);

        debug!(
            hook = %hook,
            plugin_id = %plugin,
            load_order,
            "Hook handler subscribed"
        );
    }

    /// Sets the notification order for a hook point.
    pub fn set_order(&mut self, hook: HookPoint, order: HookOrder) {
        self.orders.insert(hook, order);
    }

    /// Returns the notification order for a hook point.
    pub fn order(&self, hook: &HookPoint) -> HookOrder {
        self.orders.get(hook).copied().unwrap_or_default()
    }

    /// Returns the subscriptions for a hook point in notification order.
    pub fn subscribers(&self, hook: &HookPoint) -> Vec<Subscription> {
        let Some(entries) = self.subscriptions.get(hook) else {
            return Vec::new();
        };
        match self.order(hook) {
            HookOrder::LoadOrder => entries.clone(),
            HookOrder::Reverse => entries.iter().rev().cloned().collect(),
        }
    }

    /// Returns whether any handlers are subscribed to a hook point.
    pub fn has_subscribers(&self, hook: &HookPoint) -> bool {
        self.subscriptions
            .get(hook)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Returns the number of handlers subscribed to a hook point.
    pub fn subscriber_count(&self, hook: &HookPoint) -> usize {
        self.subscriptions.get(hook).map_or(0, Vec::len)
    }

    /// Returns all hook points with at least one subscriber.
    pub fn registered_hooks(&self) -> Vec<HookPoint> {
        let mut hooks: Vec<HookPoint> = self.subscriptions.keys().cloned().collect();
        hooks.sort();
        hooks
    }
}
