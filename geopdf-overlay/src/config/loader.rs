//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use super::AppConfig;
use crate::error::{OverlayError, OverlayResult};

/// Load configuration from `geopdf-overlay.*` and `GEOPDF__*` env vars
pub fn load_app_config() -> OverlayResult<AppConfig> {
    load_app_config_from("geopdf-overlay")
}

/// Load configuration from the named file (extension optional) and env vars
pub fn load_app_config_from(file: &str) -> OverlayResult<AppConfig> {
    Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("GEOPDF")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| OverlayError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| OverlayError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}
