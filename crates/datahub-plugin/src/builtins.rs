//! Built-in defaults: terminals used when no plugin supplies a Replacement.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use datahub_core::AppResult;

use crate::actions::Action;
use crate::auth::{AuthDecision, AuthRule};
use crate::context::{CallContext, Payload};
use crate::validation::PayloadValidator;

/// Name of the built-in status action.
pub const STATUS_SHOW: &str = "status_show";

/// Default actions, auth rules, and validators supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct CoreDefaults {
    actions: Vec<(String, Arc<dyn Action>)>,
    auth_rules: Vec<(String, Arc<dyn AuthRule>)>,
    validators: Vec<(String, Arc<dyn PayloadValidator>)>,
}

impl CoreDefaults {
    /// Creates an empty set of defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a default action.
    pub fn action(mut self, name: &str, action: Arc<dyn Action>) -> Self {
        self.actions.push((name.to_string(), action));
        self
    }

    /// Adds a default auth rule.
    pub fn auth_rule(mut self, name: &str, rule: Arc<dyn AuthRule>) -> Self {
        self.auth_rules.push((name.to_string(), rule));
        self
    }

    /// Adds a default payload validator.
    pub fn validator(mut self, name: &str, validator: Arc<dyn PayloadValidator>) -> Self {
        self.validators.push((name.to_string(), validator));
        self
    }

    /// Default actions.
    pub fn actions(&self) -> &[(String, Arc<dyn Action>)] {
        &self.actions
    }

    /// Default auth rules.
    pub fn auth_rules(&self) -> &[(String, Arc<dyn AuthRule>)] {
        &self.auth_rules
    }

    /// Default validators.
    pub fn validators(&self) -> &[(String, Arc<dyn PayloadValidator>)] {
        &self.validators
    }
}

/// The defaults every deployment starts from.
pub fn core_defaults() -> CoreDefaults {
    CoreDefaults::new()
        .action(STATUS_SHOW, Arc::new(StatusShow))
        .auth_rule(STATUS_SHOW, Arc::new(AnyoneMayRead))
}

/// Reports the version, active extensions, and registry generation.
#[derive(Debug)]
struct StatusShow;

#[async_trait]
impl Action for StatusShow {
    async fn call(&self, ctx: &mut CallContext, _payload: Payload) -> AppResult<Value> {
        let snapshot = ctx.snapshot()?;
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "extensions": snapshot.plugins().names(),
            "generation": snapshot.generation(),
        }))
    }

    fn side_effect_free(&self) -> bool {
        true
    }
}

/// Allows every caller, anonymous included.
#[derive(Debug)]
struct AnyoneMayRead;

#[async_trait]
impl AuthRule for AnyoneMayRead {
    async fn check(&self, _ctx: &mut CallContext, _payload: &Payload) -> AppResult<AuthDecision> {
        Ok(AuthDecision::allow())
    }

    fn allow_anonymous(&self) -> bool {
        true
    }
}
