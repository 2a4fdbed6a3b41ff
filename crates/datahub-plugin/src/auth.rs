//! Authorization gate: resolves and runs the auth rule for an action.
//!
//! Auth rules live in their own namespace, separate from actions, but are
//! resolved the same way: plugins supply Replacements ([`AuthRule`]) or
//! ChainLinks ([`AuthLink`]) and the namespace precedence decides which
//! Replacement becomes the terminal. Deployments where the first plugin to
//! define a rule must win configure the namespace as `first_wins`.
//!
//! Before the chain runs the gate applies three shortcuts, in order:
//!
//! 1. `ignore_auth` on the context allows the call outright;
//! 2. sysadmins are allowed unless the terminal rule opts into
//!    [`AuthRule::check_sysadmins`];
//! 3. anonymous callers are denied unless the terminal rule declares
//!    [`AuthRule::allow_anonymous`].
//!
//! A denial is an ordinary [`AuthDecision`]; only
//! [`AuthGate::authorize`] turns it into a `NotAuthorized` error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use datahub_core::config::Precedence;
use datahub_core::{AppError, AppResult};

use crate::chain::{Callable, ChainPlan, ChainRegistry};
use crate::context::{CallContext, Payload};

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDecision {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Why the call was denied.
    pub reason: Option<String>,
}

impl AuthDecision {
    /// Allows the call.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Denies the call with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// A terminal authorization rule.
#[async_trait]
pub trait AuthRule: Send + Sync + std::fmt::Debug {
    /// Decides whether the call may proceed.
    async fn check(&self, ctx: &mut CallContext, payload: &Payload) -> AppResult<AuthDecision>;

    /// Whether callers without a principal reach [`AuthRule::check`].
    fn allow_anonymous(&self) -> bool {
        false
    }

    /// Whether sysadmins are checked like everyone else.
    fn check_sysadmins(&self) -> bool {
        false
    }
}

/// A wrapper around the remainder of an auth chain.
#[async_trait]
pub trait AuthLink: Send + Sync + std::fmt::Debug {
    /// Runs the link. Call `next.run(..)` to defer to the wrapped rule.
    async fn check(
        &self,
        ctx: &mut CallContext,
        payload: &Payload,
        next: AuthNext<'_>,
    ) -> AppResult<AuthDecision>;
}

/// A Replacement or ChainLink for an auth rule name.
pub type AuthCallable = Callable<dyn AuthRule, dyn AuthLink>;

/// A resolved authorization chain.
pub type AuthPlan = ChainPlan<dyn AuthRule, dyn AuthLink>;

/// Handle to the part of an auth chain below the current link.
#[derive(Debug, Clone, Copy)]
pub struct AuthNext<'a> {
    plan: &'a AuthPlan,
    position: usize,
}

impl<'a> AuthNext<'a> {
    /// Starts at the outermost element of `plan`.
    pub fn new(plan: &'a AuthPlan) -> Self {
        Self { plan, position: 0 }
    }

    /// Name of the rule being checked.
    pub fn operation(&self) -> &str {
        self.plan.name()
    }

    /// Runs the remainder of the chain.
    pub async fn run(self, ctx: &mut CallContext, payload: &Payload) -> AppResult<AuthDecision> {
        ctx.check_cancelled()?;

        match self.plan.links().get(self.position) {
            Some(link) => {
                let next = AuthNext {
                    plan: self.plan,
                    position: self.position + 1,
                };
                link.handler.check(ctx, payload, next).await
            }
            None => self.plan.terminal().handler.check(ctx, payload).await,
        }
    }
}

/// Registry of auth rules plus the pre-chain shortcuts.
#[derive(Debug)]
pub struct AuthGate {
    /// Auth chains.
    chains: ChainRegistry<dyn AuthRule, dyn AuthLink>,
}

impl AuthGate {
    /// Creates an empty auth namespace.
    pub fn new(precedence: Precedence) -> Self {
        Self {
            chains: ChainRegistry::new("auth", precedence),
        }
    }

    /// Replacement precedence of this namespace.
    pub fn precedence(&self) -> Precedence {
        self.chains.precedence()
    }

    /// Registers a plugin contribution.
    pub fn register(&mut self, plugin: &str, load_order: u32, name: &str, callable: AuthCallable) {
        self.chains.register(plugin, load_order, name, callable);
    }

    /// Registers a built-in default rule.
    pub fn register_default(&mut self, name: &str, rule: Arc<dyn AuthRule>) {
        self.chains.register_default(name, rule);
    }

    /// Resolves the chain for a rule.
    pub fn resolve(&self, name: &str) -> AppResult<Arc<AuthPlan>> {
        self.chains.resolve(name)
    }

    /// All resolvable rule names, sorted.
    pub fn list_rules(&self) -> Vec<String> {
        self.chains.names()
    }

    /// Checks whether the call described by `ctx` and `payload` may run
    /// the action `name`.
    ///
    /// Fails only when no rule is resolvable or a rule raises; a denial is
    /// returned as `Ok` with `allowed == false`.
    pub async fn check(
        &self,
        name: &str,
        ctx: &mut CallContext,
        payload: &Payload,
    ) -> AppResult<AuthDecision> {
        if ctx.ignore_auth {
            debug!(operation = %name, "Authorization skipped (ignore_auth)");
            return Ok(AuthDecision::allow());
        }

        let plan = self.resolve(name)?;
        let rule = &plan.terminal().handler;

        if ctx.is_sysadmin() && !rule.check_sysadmins() {
            return Ok(AuthDecision::allow());
        }

        if ctx.principal().is_none() && !rule.allow_anonymous() {
            return Ok(AuthDecision::deny(format!(
                "Action {name} requires an authenticated user"
            )));
        }

        AuthNext::new(&plan).run(ctx, payload).await
    }

    /// Runs [`AuthGate::check`] and converts a denial into a
    /// `NotAuthorized` error carrying the reason.
    pub async fn authorize(
        &self,
        name: &str,
        ctx: &mut CallContext,
        payload: &Payload,
    ) -> AppResult<()> {
        let decision = self.check(name, ctx, payload).await?;
        if decision.allowed {
            return Ok(());
        }

        let reason = decision
            .reason
            .unwrap_or_else(|| format!("User not authorized to call {name}"));
        info!(
            operation = %name,
            actor = ?ctx.actor(),
            request_id = %ctx.request_id(),
            reason = %reason,
            "Authorization denied"
        );
        Err(AppError::not_authorized(reason))
    }
}
