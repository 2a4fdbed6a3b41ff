//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::actions::{Action, ActionLink, Next};
pub use crate::auth::{AuthDecision, AuthLink, AuthNext, AuthRule};
pub use crate::capability::{Capability, Registrar};
pub use crate::context::{CallContext, Payload, PersistenceSession, Principal};
pub use crate::hooks::definitions::{HookAction, HookEvent, HookPoint, events};
pub use crate::hooks::registry::HookHandler;
pub use crate::registry::{Plugin, PluginInfo};
pub use crate::validation::PayloadValidator;

pub use crate::traits::{FnAction, FnActionLink, FnAuthRule, FnHook};

pub use crate::{payload, plugin_info};

pub use datahub_core::{AppError, AppResult, ErrorKind};
