//! Activity stream plugin for DataHub.
//!
//! Records an activity whenever a dataset is created, updated, or deleted,
//! lists them through `activity_list`, and adds an `activity_count` to every
//! `package_show` result.

pub mod actions;
pub mod hooks;
pub mod plugin;
pub mod stream;

pub use plugin::{ActivityPlugin, PLUGIN_NAME};
pub use stream::{Activity, ActivityStream, ActivityType};
