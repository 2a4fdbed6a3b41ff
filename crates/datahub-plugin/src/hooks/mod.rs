//! Hook system: subscription registry, dispatcher, and hook definitions.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookAction, HookEvent, HookPoint};
pub use dispatcher::HookDispatcher;
pub use registry::{HookHandler, HookRegistry, Subscription};
