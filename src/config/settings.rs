//! TOML-based configuration for relmap.
//!
//! Example configuration:
//! ```toml
//! [resolution]
//! default_schema = "default"   # schema used when a table reference omits one
//! record_usages = true         # populate reference-usage lists
//! auto_milestoning = true      # generate milestoning property mappings
//!
//! [logging]
//! filter = "relmap=info"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Store and mapping resolution.
    pub resolution: ResolutionSettings,

    /// Logging configuration for the binary.
    pub logging: LoggingSettings,
}

/// Resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Schema assumed when a table reference omits one.
    pub default_schema: String,

    /// Populate reference-usage lists while resolving.
    pub record_usages: bool,

    /// Generate `milestoning` property mappings for temporal classes.
    pub auto_milestoning: bool,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            default_schema: "default".to_string(),
            record_usages: true,
            auto_milestoning: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "relmap=info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `RELMAP_CONFIG`
    /// 2. `./relmap.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("RELMAP_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("relmap.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.resolution.default_schema.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "resolution.default_schema must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
