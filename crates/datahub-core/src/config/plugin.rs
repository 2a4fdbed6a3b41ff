//! Plugin system configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which Replacement wins when several extensions replace the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// The most recently loaded extension wins.
    #[default]
    LastWins,
    /// The first loaded extension wins.
    FirstWins,
}

/// Order in which subscribers of one hook point are notified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookOrder {
    /// Ascending load order.
    #[default]
    LoadOrder,
    /// Descending load order.
    Reverse,
}

/// Plugin system configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Extension names to activate, in load order.
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Replacement precedence for the action namespace.
    #[serde(default)]
    pub action_precedence: Precedence,
    /// Replacement precedence for the authorization namespace.
    #[serde(default)]
    pub auth_precedence: Precedence,
    /// Per hook point notification order, keyed by hook point name.
    #[serde(default)]
    pub hook_order: HashMap<String, HookOrder>,
}

impl PluginConfig {
    /// Returns the configured notification order for a hook point name.
    pub fn hook_order_for(&self, hook: &str) -> HookOrder {
        self.hook_order.get(hook).copied().unwrap_or_default()
    }
}
