//! Configuration types.
//!
//! Configuration lives in `<config dir>/gridsync/config.toml`. Every field has
//! a default, so a missing file or a partial file is valid.
//!
//! ```toml
//! [engine]
//! debounce_ms = 300
//! default_limit = 10
//! reset_page_on_filter_change = true
//!
//! [api]
//! base_url = "http://localhost:8080"
//! timeout_secs = 30
//! page_unit = "page"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::query::{PageUnit, DEFAULT_LIMIT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reconciliation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// REST backend settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Reconciliation engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period for search input, in milliseconds.
    pub debounce_ms: u64,

    /// Page size for a freshly mounted screen.
    pub default_limit: u32,

    /// Jump back to page 1 whenever a filter changes.
    pub reset_page_on_filter_change: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            default_limit: DEFAULT_LIMIT,
            reset_page_on_filter_change: true,
        }
    }
}

impl EngineConfig {
    /// The debounce quiet period.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// REST backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend, without the `/api/v1` prefix.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Pagination unit the backend expects.
    pub page_unit: PageUnit,

    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
            page_unit: PageUnit::Page,
            api_key: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load from the default location, falling back to defaults if the file
    /// does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.debounce_ms must be positive".to_string(),
            ));
        }
        if self.engine.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "engine.default_limit must be positive".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "api.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gridsync"))
}

/// Get the path to config.toml.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}
