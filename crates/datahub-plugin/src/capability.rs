//! Capability index: which plugin implements which extension point.
//!
//! Every plugin declares its capabilities up front. While the registry is
//! built each plugin receives a [`Registrar`] that records its
//! contributions and rejects any contribution to a capability the plugin
//! did not declare.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use datahub_core::{AppError, AppResult};

use crate::actions::{Action, ActionCallable, ActionLink};
use crate::auth::{AuthCallable, AuthLink, AuthRule};
use crate::chain::{Callable, ContributionForm};
use crate::hooks::definitions::HookPoint;
use crate::hooks::registry::HookHandler;
use crate::registry::{Extension, PluginRegistry};
use crate::validation::PayloadValidator;

/// A named extension point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "point")]
pub enum Capability {
    /// Contributes actions and payload validators.
    Actions,
    /// Contributes auth rules.
    AuthRules,
    /// Observes a hook point.
    Hooks(HookPoint),
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Actions => write!(f, "actions"),
            Self::AuthRules => write!(f, "auth_rules"),
            Self::Hooks(point) => write!(f, "hooks:{point}"),
        }
    }
}

/// How a contribution combines with others of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredForm {
    /// Supplies the terminal.
    Replacement,
    /// Wraps the rest of the chain.
    ChainLink,
    /// Observes a hook point.
    Observer,
}

impl From<ContributionForm> for DeclaredForm {
    fn from(form: ContributionForm) -> Self {
        match form {
            ContributionForm::Replacement => Self::Replacement,
            ContributionForm::ChainLink => Self::ChainLink,
        }
    }
}

/// The callable carried by a contribution.
#[derive(Debug, Clone)]
pub enum Callback {
    /// Action Replacement or ChainLink.
    Action(ActionCallable),
    /// Auth rule Replacement or ChainLink.
    AuthRule(AuthCallable),
    /// Payload validator for an action.
    Validator(Arc<dyn PayloadValidator>),
    /// Hook observer.
    Hook(Arc<dyn HookHandler>),
}

/// One entry a plugin added through its [`Registrar`].
#[derive(Debug, Clone)]
pub struct Contribution {
    /// Extension point the entry belongs to.
    pub capability: Capability,
    /// Action or rule name; the event point name for hooks.
    pub name: String,
    /// Contributing plugin.
    pub plugin: String,
    /// Load order of the contributing plugin.
    pub load_order: u32,
    /// The callable.
    pub callback: Callback,
}

impl Contribution {
    /// How the contribution combines with others of the same name.
    pub fn form(&self) -> DeclaredForm {
        match &self.callback {
            Callback::Action(callable) => callable.form().into(),
            Callback::AuthRule(callable) => callable.form().into(),
            Callback::Validator(_) => DeclaredForm::Replacement,
            Callback::Hook(_) => DeclaredForm::Observer,
        }
    }
}

/// Collects the contributions of one plugin.
#[derive(Debug)]
pub struct Registrar<'a> {
    extension: &'a Extension,
    declared: Vec<Capability>,
    contributions: Vec<Contribution>,
}

impl<'a> Registrar<'a> {
    /// Creates a registrar for an extension.
    pub fn new(extension: &'a Extension) -> Self {
        Self {
            declared: extension.plugin().capabilities(),
            extension,
            contributions: Vec::new(),
        }
    }

    /// Name of the plugin being registered.
    pub fn plugin(&self) -> &str {
        self.extension.name()
    }

    /// Registers a Replacement action.
    pub fn action(&mut self, name: &str, action: Arc<dyn Action>) -> AppResult<&mut Self> {
        self.push(
            Capability::Actions,
            name,
            Callback::Action(Callable::Replacement(action)),
        )
    }

    /// Registers a ChainLink around an action.
    pub fn chain_action(&mut self, name: &str, link: Arc<dyn ActionLink>) -> AppResult<&mut Self> {
        self.push(
            Capability::Actions,
            name,
            Callback::Action(Callable::ChainLink(link)),
        )
    }

    /// Registers a payload validator for an action.
    pub fn validator(
        &mut self,
        name: &str,
        validator: Arc<dyn PayloadValidator>,
    ) -> AppResult<&mut Self> {
        self.push(Capability::Actions, name, Callback::Validator(validator))
    }

    /// Registers a Replacement auth rule.
    pub fn auth_rule(&mut self, name: &str, rule: Arc<dyn AuthRule>) -> AppResult<&mut Self> {
        self.push(
            Capability::AuthRules,
            name,
            Callback::AuthRule(Callable::Replacement(rule)),
        )
    }

    /// Registers a ChainLink around an auth rule.
    pub fn chain_auth_rule(
        &mut self,
        name: &str,
        link: Arc<dyn AuthLink>,
    ) -> AppResult<&mut Self> {
        self.push(
            Capability::AuthRules,
            name,
            Callback::AuthRule(Callable::ChainLink(link)),
        )
    }

    /// Subscribes to a hook point.
    pub fn subscribe(
        &mut self,
        point: HookPoint,
        handler: Arc<dyn HookHandler>,
    ) -> AppResult<&mut Self> {
        let name = point.to_string();
        self.push(Capability::Hooks(point), &name, Callback::Hook(handler))
    }

    /// Consumes the registrar, returning what was recorded.
    pub fn finish(self) -> Vec<Contribution> {
        self.contributions
    }

    fn push(
        &mut self,
        capability: Capability,
        name: &str,
        callback: Callback,
    ) -> AppResult<&mut Self> {
        if !self.declared.contains(&capability) {
            return Err(AppError::configuration(format!(
                "Plugin '{}' contributes '{}' to capability '{}' without declaring it",
                self.extension.name(),
                name,
                capability
            )));
        }

        self.contributions.push(Contribution {
            capability,
            name: name.to_string(),
            plugin: self.extension.name().to_string(),
            load_order: self.extension.load_order(),
            callback,
        });
        Ok(self)
    }
}

/// Capabilities and contributions of the active plugins.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    /// Capability → providers in ascending load order.
    providers: BTreeMap<Capability, Vec<String>>,
    /// Plugin name → declared capabilities.
    declared: BTreeMap<String, Vec<Capability>>,
    /// Every contribution in ascending load order.
    contributions: Vec<Contribution>,
}

impl CapabilityIndex {
    /// Collects the declarations and contributions of every active plugin.
    pub fn build(registry: &PluginRegistry) -> AppResult<Self> {
        let mut index = Self::default();

        for extension in registry.ordered() {
            let mut registrar = Registrar::new(extension);
            extension.plugin().register(&mut registrar)?;

            for capability in &registrar.declared {
                index
                    .providers
                    .entry(capability.clone())
                    .or_default()
                    .push(extension.name().to_string());
            }
            index
                .declared
                .insert(extension.name().to_string(), registrar.declared.clone());

            let contributions = registrar.finish();
            debug!(
                plugin_id = %extension.name(),
                contribution_count = contributions.len(),
                "Plugin contributions collected"
            );
            index.contributions.extend(contributions);
        }

        Ok(index)
    }

    /// Capabilities declared by a plugin.
    pub fn capabilities_of(&self, plugin: &str) -> &[Capability] {
        self.declared.get(plugin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Plugins implementing a capability, in ascending load order.
    pub fn providers(&self, capability: &Capability) -> &[String] {
        self.providers
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any active plugin implements a capability.
    pub fn is_provided(&self, capability: &Capability) -> bool {
        !self.providers(capability).is_empty()
    }

    /// All contributions in ascending load order.
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }
}
