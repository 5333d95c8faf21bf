//! Configuration module for streamflow
//!
//! A pipeline run is described by an [`AppConfig`]: the playback clock time
//! base, the buffer capacity between threaded stages, logging and the shape of
//! the demo source. Files are TOML by default; a `.json` extension switches to
//! JSON.
//!
//! # Config Location
//!
//! Without an explicit path the configuration lives in the platform config
//! directory:
//! - **Linux**: `~/.config/streamflow-rs/streamflow.toml`
//! - **macOS**: `~/Library/Application Support/streamflow-rs/streamflow.toml`
//! - **Windows**: `%APPDATA%\streamflow-rs\streamflow.toml`
//!
//! # Example
//!
//! ```ignore
//! use streamflow::config::AppConfig;
//! use streamflow::logging::TracingSink;
//!
//! let config = AppConfig::load_or_default("streamflow.toml", &TracingSink);
//! config.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, StreamError};
use crate::logging::LogSink;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "streamflow-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "streamflow.toml";

// ==================== Config Directory ====================

/// Get the platform config directory for streamflow
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete configuration of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Pipeline name, used in logs
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub buffer: BufferSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub source: SourceSettings,
}

fn default_config_version() -> u32 {
    1
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            name: default_pipeline_name(),
            playback: PlaybackSettings::default(),
            buffer: BufferSettings::default(),
            logging: LoggingSettings::default(),
            source: SourceSettings::default(),
        }
    }
}

impl AppConfig {
    /// Create a config with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                StreamError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            Self::from_toml_str(&content).map_err(|e| e.with_context(format!("{:?}", path)))
        }
    }

    /// Load a config file, returning defaults if any error occurs.
    /// The failure is reported to `logger` as a warning.
    pub fn load_or_default(path: impl AsRef<Path>, logger: &dyn LogSink) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            logger.warn("config", &format!("Failed to load config, using defaults: {}", e));
            Self::default()
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| StreamError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Render as a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StreamError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Save config to disk, TOML unless the extension is `.json`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StreamError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| {
                StreamError::Serialization(format!("Failed to serialize config: {}", e))
            })?
        } else {
            self.to_toml_string()?
        };

        std::fs::write(path, content).map_err(|e| {
            StreamError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check the settings for values the runtime would reject
    pub fn validate(&self) -> Result<()> {
        let p = &self.playback;
        if !(p.frame_timestep > 0.0) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "frame_timestep must be positive, got {}",
                p.frame_timestep
            )));
        }
        if !(p.end_time > p.start_time) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "end_time {} must be after start_time {}",
                p.end_time, p.start_time
            )));
        }
        if !(p.fps > 0.0) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "fps must be positive, got {}",
                p.fps
            )));
        }
        if let Some(window) = p.window {
            if !(window.end > window.start) {
                return Err(StreamError::ConfigurationInvalid(format!(
                    "window end {} must be after window start {}",
                    window.end, window.start
                )));
            }
        }
        if self.buffer.capacity == 1 {
            return Err(StreamError::ConfigurationInvalid(
                "buffer capacity 1 is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

// ==================== Tests ====================
