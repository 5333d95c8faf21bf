//! Playback control: modes, the clock mapping time to frames, time sources

pub mod clock;
pub mod time_source;

pub use clock::{ClockPosition, ClockState, PlaybackClock, SharedClock};
pub use time_source::{ManualClock, SystemClock, TimeSource};

use serde::{Deserialize, Serialize};

/// How a pipeline advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// The caller triggers every tick with `step()`
    SingleStepTrigger,
    /// The pipeline's thread ticks as fast as the stages allow
    #[default]
    FrameBased,
    /// Ticks follow simulated time at a fixed frame rate
    TimeBased,
    /// Ticks follow wall-clock time
    RealtimeBased,
}

impl PlaybackMode {
    /// Whether positions advance by whole frames
    pub fn is_frame_driven(&self) -> bool {
        matches!(
            self,
            PlaybackMode::SingleStepTrigger | PlaybackMode::FrameBased
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlaybackMode::SingleStepTrigger => "single-step",
            PlaybackMode::FrameBased => "frame-based",
            PlaybackMode::TimeBased => "time-based",
            PlaybackMode::RealtimeBased => "realtime",
        }
    }
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
