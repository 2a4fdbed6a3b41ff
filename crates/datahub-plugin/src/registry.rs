//! Plugin registry: active extensions and their load order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use datahub_core::{AppError, AppResult};

use crate::capability::{Capability, Registrar};

/// Metadata about a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin name, used in configuration.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Author or maintainer.
    pub author: String,
}

/// Trait that all plugins must implement.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Capabilities this plugin implements. Contributing to a capability
    /// that is not declared here fails the registry build.
    fn capabilities(&self) -> Vec<Capability>;

    /// Registers the plugin's contributions.
    fn register(&self, registrar: &mut Registrar<'_>) -> AppResult<()>;

    /// Called once when the plugin is activated.
    async fn on_load(&self) -> AppResult<()> {
        Ok(())
    }

    /// Called once when the plugin is deactivated.
    async fn on_unload(&self) -> AppResult<()> {
        Ok(())
    }
}

/// An activated plugin with its load order.
#[derive(Debug, Clone)]
pub struct Extension {
    name: String,
    load_order: u32,
    plugin: Arc<dyn Plugin>,
}

impl Extension {
    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the activation sequence; unique and strictly increasing.
    pub fn load_order(&self) -> u32 {
        self.load_order
    }

    /// The plugin instance.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

/// Ordered set of active extensions.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    /// Active extensions in ascending load order.
    extensions: Vec<Extension>,
    /// Load order for the next activation.
    next_order: u32,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates plugins in the given order, assigning consecutive load
    /// orders after every order already handed out.
    ///
    /// Fails without activating anything if a name is already active or
    /// appears twice in `plugins`.
    pub fn activate(&mut self, plugins: Vec<Arc<dyn Plugin>>) -> AppResult<Vec<Extension>> {
        let mut names: Vec<String> = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let name = plugin.info().name;
            if self.is_active(&name) || names.contains(&name) {
                return Err(AppError::configuration(format!(
                    "Plugin '{name}' is already active"
                )));
            }
            names.push(name);
        }

        let mut activated = Vec::with_capacity(plugins.len());
        for (name, plugin) in names.into_iter().zip(plugins) {
            let extension = Extension {
                name,
                load_order: self.next_order,
                plugin,
            };
            self.next_order += 1;

            info!(
                plugin_id = %extension.name,
                load_order = extension.load_order,
                "Plugin activated"
            );

            self.extensions.push(extension.clone());
            activated.push(extension);
        }

        Ok(activated)
    }

    /// Deactivates a plugin. Load orders of the remaining plugins are kept.
    pub fn deactivate(&mut self, name: &str) -> AppResult<Extension> {
        let position = self
            .extensions
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{name}' is not active")))?;

        let extension = self.extensions.remove(position);
        info!(plugin_id = %name, "Plugin deactivated");
        Ok(extension)
    }

    /// Removes every extension, returning them in load order.
    pub fn clear(&mut self) -> Vec<Extension> {
        std::mem::take(&mut self.extensions)
    }

    /// Checks whether a plugin is active.
    pub fn is_active(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.name == name)
    }

    /// Gets an active extension by name.
    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.name == name)
    }

    /// Active extensions in ascending load order.
    pub fn ordered(&self) -> &[Extension] {
        &self.extensions
    }

    /// Names of the active plugins in load order.
    pub fn names(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name.clone()).collect()
    }

    /// Metadata of the active plugins in load order.
    pub fn list(&self) -> Vec<PluginInfo> {
        self.extensions.iter().map(|e| e.plugin.info()).collect()
    }

    /// Returns plugin count.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns whether no plugin is active.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
