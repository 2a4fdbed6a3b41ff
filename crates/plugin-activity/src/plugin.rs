//! Activity plugin implementation: registers with the DataHub plugin system.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use datahub_core::AppResult;
use datahub_plugin::capability::{Capability, Registrar};
use datahub_plugin::hooks::HookPoint;
use datahub_plugin::plugin_info;
use datahub_plugin::registry::{Plugin, PluginInfo};

use crate::actions::{
    ACTIVITY_LIST, ActivityList, ActivityListAuth, ActivityListValidator, PACKAGE_SHOW,
    PackageShowActivityCount,
};
use crate::hooks::DatasetActivityHook;
use crate::stream::ActivityStream;

/// Name used to enable the plugin in configuration.
pub const PLUGIN_NAME: &str = "activity";

/// Records dataset activity and exposes it through `activity_list`.
#[derive(Debug, Default)]
pub struct ActivityPlugin {
    stream: Arc<ActivityStream>,
}

impl ActivityPlugin {
    /// Creates the plugin with an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stream this plugin writes to.
    pub fn stream(&self) -> &Arc<ActivityStream> {
        &self.stream
    }
}

#[async_trait]
impl Plugin for ActivityPlugin {
    fn info(&self) -> PluginInfo {
        plugin_info!(
            name: PLUGIN_NAME,
            version: env!("CARGO_PKG_VERSION"),
            description: "Dataset activity streams",
            author: "DataHub Team"
        )
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::Actions,
            Capability::AuthRules,
            Capability::Hooks(HookPoint::Dataset),
        ]
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> AppResult<()> {
        registrar
            .action(ACTIVITY_LIST, Arc::new(ActivityList::new(Arc::clone(&self.stream))))?
            .validator(ACTIVITY_LIST, Arc::new(ActivityListValidator))?
            .auth_rule(ACTIVITY_LIST, Arc::new(ActivityListAuth))?
            .chain_action(
                PACKAGE_SHOW,
                Arc::new(PackageShowActivityCount::new(Arc::clone(&self.stream))),
            )?
            .subscribe(
                HookPoint::Dataset,
                Arc::new(DatasetActivityHook::new(Arc::clone(&self.stream))),
            )?;
        Ok(())
    }

    async fn on_load(&self) -> AppResult<()> {
        let recorded = self.stream.len().await;
        info!(recorded, "Activity plugin loaded");
        Ok(())
    }

    async fn on_unload(&self) -> AppResult<()> {
        info!("Activity plugin unloaded");
        Ok(())
    }
}
