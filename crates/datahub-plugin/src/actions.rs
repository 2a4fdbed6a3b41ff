//! Action registry: the uniform call surface for portal business logic.
//!
//! Plugins contribute either a Replacement ([`Action`]) or a ChainLink
//! ([`ActionLink`]) for an action name. A link receives a [`Next`] handle
//! and decides whether to call the remainder of the chain, with the same or
//! a transformed payload, and what to do with its result or error.
//!
//! The registry only runs chains. Callers go through
//! [`RegistrySnapshot::dispatch`](crate::snapshot::RegistrySnapshot::dispatch),
//! which runs the authorization gate first.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use datahub_core::AppResult;
use datahub_core::config::Precedence;

use crate::chain::{Callable, ChainPlan, ChainRegistry};
use crate::context::{CallContext, Payload};
use crate::validation::PayloadValidator;

/// A terminal action implementation.
#[async_trait]
pub trait Action: Send + Sync + std::fmt::Debug {
    /// Runs the action.
    async fn call(&self, ctx: &mut CallContext, payload: Payload) -> AppResult<Value>;

    /// Whether the action only reads state (safe for GET requests).
    fn side_effect_free(&self) -> bool {
        false
    }
}

/// A wrapper around the remainder of an action chain.
#[async_trait]
pub trait ActionLink: Send + Sync + std::fmt::Debug {
    /// Runs the link. Call `next.run(..)` to continue the chain; returning
    /// without calling it short-circuits everything closer to the terminal.
    async fn call(&self, ctx: &mut CallContext, payload: Payload, next: Next<'_>)
    -> AppResult<Value>;
}

/// A Replacement or ChainLink for an action name.
pub type ActionCallable = Callable<dyn Action, dyn ActionLink>;

/// A resolved action chain.
pub type ActionPlan = ChainPlan<dyn Action, dyn ActionLink>;

/// Handle to the part of a chain below the current link.
#[derive(Debug, Clone, Copy)]
pub struct Next<'a> {
    plan: &'a ActionPlan,
    position: usize,
}

impl<'a> Next<'a> {
    /// Starts at the outermost element of `plan`.
    pub fn new(plan: &'a ActionPlan) -> Self {
        Self { plan, position: 0 }
    }

    /// Name of the action being dispatched.
    pub fn operation(&self) -> &str {
        self.plan.name()
    }

    /// Number of callables left below this point, terminal included.
    pub fn remaining(&self) -> usize {
        self.plan.len() - self.position
    }

    /// Runs the remainder of the chain.
    pub async fn run(self, ctx: &mut CallContext, payload: Payload) -> AppResult<Value> {
        ctx.check_cancelled()?;

        match self.plan.links().get(self.position) {
            Some(link) => {
                trace!(
                    operation = %self.plan.name(),
                    plugin_id = %link.plugin,
                    "Entering chain link"
                );
                let next = Next {
                    plan: self.plan,
                    position: self.position + 1,
                };
                link.handler.call(ctx, payload, next).await
            }
            None => {
                trace!(operation = %self.plan.name(), "Entering terminal");
                self.plan.terminal().handler.call(ctx, payload).await
            }
        }
    }
}

/// Registry of action contributions and payload validators.
#[derive(Debug)]
pub struct ActionRegistry {
    /// Action chains.
    chains: ChainRegistry<dyn Action, dyn ActionLink>,
    /// Action name → plugin validator, picked by the namespace precedence.
    validators: HashMap<String, Arc<dyn PayloadValidator>>,
    /// Action name → built-in validator, used when no plugin supplies one.
    default_validators: HashMap<String, Arc<dyn PayloadValidator>>,
}

impl ActionRegistry {
    /// Creates an empty action namespace.
    pub fn new(precedence: Precedence) -> Self {
        Self {
            chains: ChainRegistry::new("action", precedence),
            validators: HashMap::new(),
            default_validators: HashMap::new(),
        }
    }

    /// Registers a plugin contribution.
    pub fn register(&mut self, plugin: &str, load_order: u32, name: &str, callable: ActionCallable) {
        self.chains.register(plugin, load_order, name, callable);
    }

    /// Registers a built-in default implementation.
    pub fn register_default(&mut self, name: &str, action: Arc<dyn Action>) {
        self.chains.register_default(name, action);
    }

    /// Registers a plugin's payload validator for an action.
    ///
    /// Registrations arrive in ascending load order; the namespace
    /// precedence decides whether a later one replaces an earlier one.
    pub fn register_validator(&mut self, name: &str, validator: Arc<dyn PayloadValidator>) {
        match self.chains.precedence() {
            Precedence::LastWins => {
                self.validators.insert(name.to_string(), validator);
            }
            Precedence::FirstWins => {
                self.validators
                    .entry(name.to_string())
                    .or_insert(validator);
            }
        }
    }

    /// Registers a built-in payload validator for an action.
    pub fn register_default_validator(
        &mut self,
        name: &str,
        validator: Arc<dyn PayloadValidator>,
    ) {
        self.default_validators.insert(name.to_string(), validator);
    }

    /// Resolves the chain for an action.
    pub fn resolve(&self, name: &str) -> AppResult<Arc<ActionPlan>> {
        self.chains.resolve(name)
    }

    /// Returns whether an action resolves to a terminal.
    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains(name)
    }

    /// All resolvable action names, sorted.
    pub fn list_actions(&self) -> Vec<String> {
        self.chains.names()
    }

    /// Whether the resolved terminal of `name` is side-effect free.
    pub fn is_side_effect_free(&self, name: &str) -> AppResult<bool> {
        Ok(self.resolve(name)?.terminal().handler.side_effect_free())
    }

    /// Runs the validator for `name`, if any, unless the caller vouched for
    /// the payload.
    pub async fn validate(
        &self,
        name: &str,
        ctx: &CallContext,
        payload: Payload,
    ) -> AppResult<Payload> {
        let validator = self
            .validators
            .get(name)
            .or_else(|| self.default_validators.get(name));
        match validator {
            Some(validator) if !ctx.validated => {
                debug!(operation = %name, "Validating payload");
                validator.validate(ctx, payload).await
            }
            _ => Ok(payload),
        }
    }

    /// Runs the resolved chain without consulting the authorization gate.
    pub(crate) async fn run_chain(
        plan: &ActionPlan,
        ctx: &mut CallContext,
        payload: Payload,
    ) -> AppResult<Value> {
        Next::new(plan).run(ctx, payload).await
    }
}
