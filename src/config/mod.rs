//! Configuration module for relmap.
//!
//! Handles resolution and logging settings loaded from `relmap.toml`.

mod settings;

pub use settings::{LoggingSettings, ResolutionSettings, Settings, SettingsError};
