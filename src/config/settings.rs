//! Settings sections of the pipeline configuration
//!
//! # Main Types
//!
//! - [`PlaybackSettings`] - Time base, interest window and playback controls
//! - [`BufferSettings`] - Capacity of the buffers between threaded stages
//! - [`LoggingSettings`] - Subscriber filter, output format and log file
//! - [`SourceSettings`] - Shape of the data produced by the demo source

use crate::playback::PlaybackMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default buffer capacity between reader/writer threads
pub const DEFAULT_BUFFER_CAPACITY: usize = 8;

/// Default frame timestep in milliseconds
pub const DEFAULT_FRAME_TIMESTEP: f64 = 0.1;

/// Default frames per second for time-based playback
pub const DEFAULT_FPS: f64 = 25.0;

// ==================== Playback ====================

/// Playback clock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// How the pipeline advances
    pub mode: PlaybackMode,

    /// Simulation time between two frames (ms)
    pub frame_timestep: f64,

    /// Start of the absolute time window (ms)
    pub start_time: f64,

    /// End of the absolute time window (ms, exclusive)
    pub end_time: f64,

    /// Optional interest window inside the absolute window
    pub window: Option<TimeWindow>,

    /// Playback speed factor; negative plays backwards
    pub speed: f64,

    /// Frames per second, used by time-based modes
    pub fps: f64,

    /// Wrap around at the window boundary instead of finishing
    pub repeat: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::FrameBased,
            frame_timestep: DEFAULT_FRAME_TIMESTEP,
            start_time: 0.0,
            end_time: 10.0,
            window: None,
            speed: 1.0,
            fps: DEFAULT_FPS,
            repeat: false,
        }
    }
}

/// A `[start, end)` interval in simulation time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

// ==================== Buffers ====================

/// Buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Number of slots; 0 closes the buffer, 1 is rejected
    pub capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

// ==================== Logging ====================

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Console output format
    pub format: LogFormat,

    /// Optional log file (written without ANSI colours)
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,streamflow=debug".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

/// Console log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// Newline delimited JSON
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

// ==================== Demo source ====================

/// Shape of the synthetic frames produced by the demo runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Values per frame
    pub values_per_frame: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            values_per_frame: 64,
        }
    }
}
