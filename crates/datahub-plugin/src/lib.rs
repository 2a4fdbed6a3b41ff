//! # datahub-plugin
//!
//! Plugin dispatch core for DataHub. Provides:
//!
//! - Plugin activation with strictly increasing load order
//! - Capability index checked at registry build time
//! - Action chains with Replacement and ChainLink contributions
//! - Authorization gate resolved the same way, in its own namespace
//! - Hook dispatcher with Continue/ContinueWith/Abort semantics
//! - Immutable registry snapshots swapped atomically on reconfiguration

pub mod actions;
pub mod auth;
pub mod builtins;
pub mod capability;
pub mod catalog;
pub mod chain;
pub mod context;
pub mod hooks;
pub mod macros;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod snapshot;
pub mod traits;
pub mod validation;

pub use serde_json;

pub use actions::{Action, ActionLink, ActionRegistry, Next};
pub use auth::{AuthDecision, AuthGate, AuthLink, AuthRule};
pub use builtins::{CoreDefaults, core_defaults};
pub use capability::{Capability, CapabilityIndex, Registrar};
pub use catalog::PluginCatalog;
pub use context::{CallContext, Payload, Principal};
pub use hooks::{HookAction, HookDispatcher, HookEvent, HookPoint, HookRegistry};
pub use manager::PluginManager;
pub use registry::{Plugin, PluginInfo, PluginRegistry};
pub use snapshot::RegistrySnapshot;
