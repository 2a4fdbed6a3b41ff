//! Plugin manager: activation, deactivation, and the live snapshot.
//!
//! Reconfiguration is serialized by a mutex and publishes a freshly built
//! [`RegistrySnapshot`] with a single atomic swap. Dispatches load the
//! current snapshot once and keep it until they finish.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use datahub_core::config::PluginConfig;
use datahub_core::{AppError, AppResult};

use crate::auth::AuthDecision;
use crate::builtins::CoreDefaults;
use crate::catalog::PluginCatalog;
use crate::context::{CallContext, Payload};
use crate::hooks::definitions::HookPoint;
use crate::registry::{Extension, PluginInfo, PluginRegistry};
use crate::snapshot::RegistrySnapshot;

/// Mutable state guarded by the reconfiguration lock.
#[derive(Debug)]
struct ManagerState {
    registry: PluginRegistry,
    generation: u64,
}

/// Owns the plugin lifecycle and the snapshot callers dispatch against.
#[derive(Debug)]
pub struct PluginManager {
    /// Plugins available for activation.
    catalog: PluginCatalog,
    /// Plugin configuration.
    config: PluginConfig,
    /// Built-in defaults.
    defaults: CoreDefaults,
    /// Reconfiguration lock.
    state: Mutex<ManagerState>,
    /// Current snapshot.
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl PluginManager {
    /// Creates a manager with no active plugins.
    pub fn new(
        catalog: PluginCatalog,
        config: PluginConfig,
        defaults: CoreDefaults,
    ) -> AppResult<Self> {
        let registry = PluginRegistry::new();
        let snapshot = RegistrySnapshot::build(1, registry.clone(), &config, &defaults)?;

        Ok(Self {
            catalog,
            config,
            defaults,
            state: Mutex::new(ManagerState {
                registry,
                generation: 1,
            }),
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    /// Activates the plugins listed in configuration, in order.
    pub async fn start(&self) -> AppResult<Arc<RegistrySnapshot>> {
        let enabled = self.config.enabled.clone();
        info!(plugins = ?enabled, "Starting plugins");
        self.activate(&enabled).await
    }

    /// Activates plugins by name after every active plugin.
    ///
    /// Either every named plugin becomes active and a new snapshot is
    /// published, or nothing changes.
    pub async fn activate(&self, names: &[String]) -> AppResult<Arc<RegistrySnapshot>> {
        let mut state = self.state.lock().await;

        let plugins = self.catalog.resolve(names)?;
        let mut registry = state.registry.clone();
        let added = registry.activate(plugins)?;

        for (loaded, extension) in added.iter().enumerate() {
            if let Err(e) = extension.plugin().on_load().await {
                error!(
                    plugin_id = %extension.name(),
                    error = %e,
                    "Plugin load failed"
                );
                Self::unload_extensions(&added[..loaded]).await;
                return Err(AppError::plugin(format!(
                    "Plugin '{}' load failed: {}",
                    extension.name(),
                    e
                )));
            }
        }

        match self.publish(&mut state, registry) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                Self::unload_extensions(&added).await;
                Err(e)
            }
        }
    }

    /// Deactivates a plugin and publishes a snapshot without it.
    pub async fn deactivate(&self, name: &str) -> AppResult<Arc<RegistrySnapshot>> {
        let mut state = self.state.lock().await;

        let mut registry = state.registry.clone();
        let extension = registry.deactivate(name)?;
        let snapshot = self.publish(&mut state, registry)?;

        Self::unload_extensions(std::slice::from_ref(&extension)).await;
        Ok(snapshot)
    }

    /// Deactivates every plugin, most recently activated first.
    pub async fn unload_all(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let mut registry = state.registry.clone();
        let extensions = registry.clear();
        self.publish(&mut state, registry)?;

        Self::unload_extensions(&extensions).await;
        info!("All plugins unloaded");
        Ok(())
    }

    /// The snapshot new dispatches run against.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Dispatches an action against the current snapshot.
    pub async fn dispatch(
        &self,
        name: &str,
        ctx: &mut CallContext,
        payload: Payload,
    ) -> AppResult<Value> {
        self.snapshot().dispatch(name, ctx, payload).await
    }

    /// Runs the authorization gate against the current snapshot.
    pub async fn check(
        &self,
        name: &str,
        ctx: &mut CallContext,
        payload: &Payload,
    ) -> AppResult<AuthDecision> {
        self.snapshot().check(name, ctx, payload).await
    }

    /// Notifies hook observers registered in the current snapshot.
    pub async fn notify(
        &self,
        ctx: &mut CallContext,
        point: &HookPoint,
        event: &str,
        payload: Payload,
    ) -> AppResult<Payload> {
        self.snapshot().notify(ctx, point, event, payload).await
    }

    /// Checks whether a plugin is active.
    pub fn is_active(&self, name: &str) -> bool {
        self.snapshot().plugins().is_active(name)
    }

    /// Lists the active plugins in load order.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.snapshot().plugins().list()
    }

    /// Plugin configuration.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Plugins available for activation.
    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    fn publish(
        &self,
        state: &mut ManagerState,
        registry: PluginRegistry,
    ) -> AppResult<Arc<RegistrySnapshot>> {
        let generation = state.generation + 1;
        let snapshot = Arc::new(RegistrySnapshot::build(
            generation,
            registry.clone(),
            &self.config,
            &self.defaults,
        )?);

        state.registry = registry;
        state.generation = generation;
        self.snapshot.store(Arc::clone(&snapshot));

        info!(
            generation,
            plugins = ?snapshot.plugins().names(),
            "Registry snapshot published"
        );
        Ok(snapshot)
    }

    async fn unload_extensions(extensions: &[Extension]) {
        for extension in extensions.iter().rev() {
            if let Err(e) = extension.plugin().on_unload().await {
                warn!(
                    plugin_id = %extension.name(),
                    error = %e,
                    "Plugin unload returned error"
                );
            }
        }
    }
}
