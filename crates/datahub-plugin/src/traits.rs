//! Closure-based implementations of the contribution traits.
//!
//! Handy for small plugins and tests: wrap a closure instead of declaring a
//! struct and an `async_trait` impl.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use datahub_core::AppResult;

use crate::actions::{Action, ActionLink, Next};
use crate::auth::{AuthDecision, AuthRule};
use crate::context::{CallContext, Payload};
use crate::hooks::definitions::{HookAction, HookEvent};
use crate::hooks::registry::HookHandler;

type ActionFn =
    dyn for<'a> Fn(&'a mut CallContext, Payload) -> BoxFuture<'a, AppResult<Value>> + Send + Sync;

type LinkFn = dyn for<'a> Fn(&'a mut CallContext, Payload, Next<'a>) -> BoxFuture<'a, AppResult<Value>>
    + Send
    + Sync;

type RuleFn = dyn Fn(&CallContext, &Payload) -> AuthDecision + Send + Sync;

type HookFn =
    dyn Fn(&mut CallContext, &HookEvent, &Payload) -> AppResult<HookAction> + Send + Sync;

/// A closure-based terminal action.
pub struct FnAction {
    side_effect_free: bool,
    handler: Arc<ActionFn>,
}

impl std::fmt::Debug for FnAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction")
            .field("side_effect_free", &self.side_effect_free)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnAction {
    /// Creates an action that may change state.
    pub fn new<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut CallContext, Payload) -> BoxFuture<'a, AppResult<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            side_effect_free: false,
            handler: Arc::new(handler),
        }
    }

    /// Creates a side-effect free action.
    pub fn read_only<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut CallContext, Payload) -> BoxFuture<'a, AppResult<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            side_effect_free: true,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Action for FnAction {
    async fn call(&self, ctx: &mut CallContext, payload: Payload) -> AppResult<Value> {
        (self.handler)(ctx, payload).await
    }

    fn side_effect_free(&self) -> bool {
        self.side_effect_free
    }
}

/// A closure-based chain link.
pub struct FnActionLink {
    handler: Arc<LinkFn>,
}

impl std::fmt::Debug for FnActionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnActionLink")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnActionLink {
    /// Creates a chain link.
    pub fn new<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut CallContext, Payload, Next<'a>) -> BoxFuture<'a, AppResult<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl ActionLink for FnActionLink {
    async fn call(
        &self,
        ctx: &mut CallContext,
        payload: Payload,
        next: Next<'_>,
    ) -> AppResult<Value> {
        (self.handler)(ctx, payload, next).await
    }
}

/// A closure-based authorization rule.
pub struct FnAuthRule {
    allow_anonymous: bool,
    check_sysadmins: bool,
    handler: Arc<RuleFn>,
}

impl std::fmt::Debug for FnAuthRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAuthRule")
            .field("allow_anonymous", &self.allow_anonymous)
            .field("check_sysadmins", &self.check_sysadmins)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnAuthRule {
    /// Creates a rule that requires an authenticated user.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CallContext, &Payload) -> AuthDecision + Send + Sync + 'static,
    {
        Self {
            allow_anonymous: false,
            check_sysadmins: false,
            handler: Arc::new(handler),
        }
    }

    /// Creates a rule that anonymous callers also reach.
    pub fn anonymous<F>(handler: F) -> Self
    where
        F: Fn(&CallContext, &Payload) -> AuthDecision + Send + Sync + 'static,
    {
        Self {
            allow_anonymous: true,
            ..Self::new(handler)
        }
    }

    /// Applies the rule to sysadmins as well.
    pub fn checking_sysadmins(mut self) -> Self {
        self.check_sysadmins = true;
        self
    }
}

#[async_trait]
impl AuthRule for FnAuthRule {
    async fn check(&self, ctx: &mut CallContext, payload: &Payload) -> AppResult<AuthDecision> {
        Ok((self.handler)(ctx, payload))
    }

    fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    fn check_sysadmins(&self) -> bool {
        self.check_sysadmins
    }
}

/// A closure-based hook handler.
pub struct FnHook {
    handler: Arc<HookFn>,
}

impl std::fmt::Debug for FnHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHook")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnHook {
    /// Creates a hook handler.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut CallContext, &HookEvent, &Payload) -> AppResult<HookAction>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl HookHandler for FnHook {
    async fn handle(
        &self,
        ctx: &mut CallContext,
        event: &HookEvent,
        payload: &Payload,
    ) -> AppResult<HookAction> {
        (self.handler)(ctx, event, payload)
    }
}
