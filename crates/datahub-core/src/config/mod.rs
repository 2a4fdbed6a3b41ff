//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};

pub use self::logging::LoggingConfig;
pub use self::plugin::{HookOrder, PluginConfig, Precedence};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin system settings.
    #[serde(default)]
    pub plugins: PluginConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `DATAHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DATAHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("plugins.enabled")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
