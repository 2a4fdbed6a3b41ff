//! Registry snapshot: an immutable view of every namespace.
//!
//! A snapshot is built once per configuration and never mutated. Dispatches
//! hold an `Arc` to the snapshot they started on, so reconfiguration never
//! changes the plan of a call that is already running.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use datahub_core::AppResult;
use datahub_core::config::PluginConfig;

use crate::actions::ActionRegistry;
use crate::auth::{AuthDecision, AuthGate};
use crate::builtins::CoreDefaults;
use crate::capability::{Callback, Capability, CapabilityIndex};
use crate::context::{CallContext, Payload};
use crate::hooks::definitions::HookPoint;
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::registry::PluginRegistry;

/// Fully resolved registry for one plugin configuration.
#[derive(Debug)]
pub struct RegistrySnapshot {
    generation: u64,
    plugins: PluginRegistry,
    capabilities: CapabilityIndex,
    actions: ActionRegistry,
    auth: AuthGate,
    hooks: HookDispatcher,
}

impl RegistrySnapshot {
    /// Builds every namespace from the active plugins and the defaults.
    ///
    /// Fails if a plugin contributes to a capability it did not declare.
    pub fn build(
        generation: u64,
        plugins: PluginRegistry,
        config: &PluginConfig,
        defaults: &CoreDefaults,
    ) -> AppResult<Self> {
        let capabilities = CapabilityIndex::build(&plugins)?;

        let mut actions = ActionRegistry::new(config.action_precedence);
        let mut auth = AuthGate::new(config.auth_precedence);
        let mut hooks = HookRegistry::new();

        for (point, order) in &config.hook_order {
            hooks.set_order(HookPoint::from(point.as_str()), *order);
        }
        for name in unmatched_hook_orders(config, &capabilities) {
            warn!(
                hook = %name,
                "Configured hook order matches no known or declared hook point"
            );
        }

        for (name, action) in defaults.actions() {
            actions.register_default(name, Arc::clone(action));
        }
        for (name, rule) in defaults.auth_rules() {
            auth.register_default(name, Arc::clone(rule));
        }
        for (name, validator) in defaults.validators() {
            actions.register_default_validator(name, Arc::clone(validator));
        }

        for contribution in capabilities.contributions() {
            let plugin = contribution.plugin.as_str();
            let order = contribution.load_order;
            let name = contribution.name.as_str();

            match (&contribution.callback, &contribution.capability) {
                (Callback::Action(callable), _) => {
                    actions.register(plugin, order, name, callable.clone());
                }
                (Callback::Validator(validator), _) => {
                    actions.register_validator(name, Arc::clone(validator));
                }
                (Callback::AuthRule(callable), _) => {
                    auth.register(plugin, order, name, callable.clone());
                }
                (Callback::Hook(handler), Capability::Hooks(point)) => {
                    hooks.subscribe(plugin, order, point.clone(), Arc::clone(handler));
                }
                (Callback::Hook(_), _) => {}
            }
        }

        debug!(
            generation,
            plugin_count = plugins.len(),
            action_count = actions.list_actions().len(),
            "Registry snapshot built"
        );

        Ok(Self {
            generation,
            plugins,
            capabilities,
            actions,
            auth,
            hooks: HookDispatcher::new(hooks),
        })
    }

    /// Monotonic build counter; the first snapshot is generation 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Active plugins.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Capability index.
    pub fn capabilities(&self) -> &CapabilityIndex {
        &self.capabilities
    }

    /// Action namespace.
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Auth namespace.
    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    /// Hook dispatcher.
    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    /// Resolves, authorizes, validates, and runs the action `name`.
    ///
    /// The context stays bound to this snapshot while the call runs, so
    /// nested dispatches through [`CallContext::dispatch`] see the same
    /// registry as the outer call.
    pub async fn dispatch(
        self: &Arc<Self>,
        name: &str,
        ctx: &mut CallContext,
        payload: Payload,
    ) -> AppResult<Value> {
        ctx.check_cancelled()?;
        let plan = self.actions.resolve(name)?;

        debug!(
            operation = %name,
            request_id = %ctx.request_id(),
            actor = ?ctx.actor(),
            generation = self.generation,
            chain = ?plan.sources(),
            "Dispatching action"
        );

        let mut bound = ctx.bind(Arc::clone(self));
        let ctx: &mut CallContext = &mut bound;
        self.auth.authorize(name, ctx, &payload).await?;
        let payload = self.actions.validate(name, ctx, payload).await?;
        ActionRegistry::run_chain(&plan, ctx, payload).await
    }

    /// Runs the authorization gate for `name` without running the action.
    pub async fn check(
        self: &Arc<Self>,
        name: &str,
        ctx: &mut CallContext,
        payload: &Payload,
    ) -> AppResult<AuthDecision> {
        ctx.check_cancelled()?;
        let mut bound = ctx.bind(Arc::clone(self));
        self.auth.check(name, &mut bound, payload).await
    }

    /// Notifies the observers of a hook point.
    pub async fn notify(
        &self,
        ctx: &mut CallContext,
        point: &HookPoint,
        event: &str,
        payload: Payload,
    ) -> AppResult<Payload> {
        self.hooks.notify(ctx, point, event, payload).await
    }
}

/// `hook_order` keys naming neither a built-in hook point nor a custom
/// point some active plugin declared, sorted.
fn unmatched_hook_orders(config: &PluginConfig, capabilities: &CapabilityIndex) -> Vec<String> {
    let mut unmatched: Vec<String> = config
        .hook_order
        .keys()
        .filter(|name| {
            let point = HookPoint::from(name.as_str());
            matches!(point, HookPoint::Custom(_))
                && !capabilities.is_provided(&Capability::Hooks(point))
        })
        .cloned()
        .collect();
    unmatched.sort();
    unmatched
}
