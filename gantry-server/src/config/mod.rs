//! Configuration for the controller daemon
//!
//! Loaded once at startup from the XDG config file. A missing file means
//! defaults; a malformed file is a structured error, not a silent default.

mod defaults;

pub use defaults::DEFAULT_CONFIG_TOML;

use std::path::Path;

use serde::Deserialize;

use gantry_utils::{paths, GantryError, Result};

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
}

/// General tuning knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Debounce interval sessions use for write coalescing, milliseconds
    pub debounce_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// TCP listener for tablet/browser sessions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:8372".into(),
        }
    }
}

/// Load configuration from the default XDG location
pub fn load() -> Result<AppConfig> {
    load_from(&paths::config_file())
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| GantryError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| GantryError::ConfigInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
