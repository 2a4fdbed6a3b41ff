//! DataHub Server: open data portal core.
//!
//! Loads configuration, activates the configured plugins, and keeps the
//! plugin registry alive until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use datahub_core::AppError;
use datahub_core::config::AppConfig;
use datahub_plugin::builtins::STATUS_SHOW;
use datahub_plugin::hooks::definitions::events;
use datahub_plugin::{CallContext, HookPoint, Payload, PluginCatalog, PluginManager, core_defaults};
use plugin_activity::ActivityPlugin;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("DATAHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Plugins compiled into this binary
fn catalog() -> Result<PluginCatalog, AppError> {
    PluginCatalog::new().with(Arc::new(ActivityPlugin::new()))
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting DataHub v{}", env!("CARGO_PKG_VERSION"));

    let manager = PluginManager::new(catalog()?, config.plugins.clone(), core_defaults())?;
    let snapshot = manager.start().await?;
    tracing::info!(
        generation = snapshot.generation(),
        actions = ?snapshot.actions().list_actions(),
        "Plugin registry ready"
    );

    let mut ctx = CallContext::new().ignoring_auth();
    manager
        .notify(&mut ctx, &HookPoint::ServerLifecycle, events::SERVER_START, Payload::new())
        .await?;

    let mut status_ctx = CallContext::new();
    let status = manager
        .dispatch(STATUS_SHOW, &mut status_ctx, Payload::new())
        .await?;
    tracing::info!(status = %status, "DataHub is up");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Err(e) = manager
        .notify(&mut ctx, &HookPoint::ServerLifecycle, events::SERVER_SHUTDOWN, Payload::new())
        .await
    {
        tracing::warn!(error = %e, "Shutdown hook failed");
    }

    manager.unload_all().await?;
    tracing::info!("DataHub stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
