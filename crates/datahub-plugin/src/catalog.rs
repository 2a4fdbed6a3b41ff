//! Plugin catalog: every plugin compiled into the binary, by name.
//!
//! Configuration refers to plugins by name; the catalog turns those names
//! into instances. Only plugins listed in configuration are activated.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use datahub_core::{AppError, AppResult};

use crate::registry::Plugin;

/// Available plugins keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a plugin available for activation.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) -> AppResult<()> {
        let name = plugin.info().name;
        if self.plugins.contains_key(&name) {
            return Err(AppError::conflict(format!(
                "Plugin '{name}' is already in the catalog"
            )));
        }
        debug!(plugin_id = %name, "Plugin added to catalog");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Builder-style [`PluginCatalog::add`].
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> AppResult<Self> {
        self.add(plugin)?;
        Ok(self)
    }

    /// Gets a plugin by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Looks up `names` in order. Fails on the first unknown name.
    pub fn resolve(&self, names: &[String]) -> AppResult<Vec<Arc<dyn Plugin>>> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    AppError::configuration(format!("Plugin '{name}' is not available"))
                })
            })
            .collect()
    }

    /// Names of every available plugin, sorted.
    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }
}
