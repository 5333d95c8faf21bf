//! Playback clock mapping simulation time to frame numbers.
//!
//! The clock covers an absolute window `[absolute_start, absolute_end)` cut
//! into frames of `timestep` milliseconds, and an interest window inside it.
//! Frame numbers are counted from the absolute start. The clock holds the
//! current position (what the pipeline works on now) and the next one; each
//! [`PlaybackClock::update`] promotes next to current and computes a new next
//! according to the playback mode.
//!
//! Rounding uses [`f64::round`] (half away from zero) everywhere a time is
//! snapped to a frame boundary. Converting an arbitrary time to the frame
//! containing it uses floor with a small tolerance.

use super::time_source::{SystemClock, TimeSource};
use super::PlaybackMode;
use crate::config::PlaybackSettings;
use crate::error::{Result, StreamError};
use std::fmt;
use std::sync::{Arc, Mutex};

const FRAME_EPSILON: f64 = 1e-9;

/// Clock handle shared between a pipeline and its controller
pub type SharedClock = Arc<Mutex<PlaybackClock>>;

/// Coarse playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    /// Configured but never played
    #[default]
    Idle,
    Running,
    /// Paused by the user or after finishing
    Paused,
}

/// A (time, frame) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockPosition {
    /// Simulation time in milliseconds
    pub time: f64,
    /// Frame number from the absolute start
    pub frame: i64,
}

pub struct PlaybackClock {
    mode: PlaybackMode,
    state: ClockState,

    timestep: f64,
    absolute_start: f64,
    absolute_end: f64,
    total_frames: i64,

    /// Current interest window, frames inclusive
    start_frame: i64,
    end_frame: i64,
    /// Current interest window in time, end exclusive
    window_start: f64,
    window_end: f64,

    current: ClockPosition,
    next: ClockPosition,

    speed: f64,
    fps: f64,
    repeat: bool,
    finished: bool,
    supports_windowing: bool,

    time_source: Arc<dyn TimeSource>,
    last_tick_ms: Option<f64>,
}

impl PlaybackClock {
    /// Clock over a single frame at time 0; call
    /// [`set_absolute_times`](Self::set_absolute_times) to configure it
    pub fn new(mode: PlaybackMode) -> Self {
        Self::with_time_source(mode, Arc::new(SystemClock::default()))
    }

    pub fn with_time_source(mode: PlaybackMode, time_source: Arc<dyn TimeSource>) -> Self {
        let origin = ClockPosition {
            time: 0.0,
            frame: 0,
        };
        Self {
            mode,
            state: ClockState::Idle,
            timestep: 1.0,
            absolute_start: 0.0,
            absolute_end: 1.0,
            total_frames: 1,
            start_frame: 0,
            end_frame: 0,
            window_start: 0.0,
            window_end: 1.0,
            current: origin,
            next: origin,
            speed: 1.0,
            fps: crate::config::settings::DEFAULT_FPS,
            repeat: false,
            finished: false,
            supports_windowing: true,
            time_source,
            last_tick_ms: None,
        }
    }

    /// Build a clock from configuration
    pub fn from_settings(settings: &PlaybackSettings) -> Result<Self> {
        let mut clock = Self::new(settings.mode);
        clock.set_absolute_times(settings.frame_timestep, settings.start_time, settings.end_time)?;
        clock.set_fps(settings.fps)?;
        clock.set_repeat(settings.repeat);
        clock.speed(settings.speed);
        if let Some(window) = settings.window {
            clock.time_window(window.start, window.end)?;
        }
        Ok(clock)
    }

    /// Wrap for sharing with a pipeline
    pub fn into_shared(self) -> SharedClock {
        Arc::new(Mutex::new(self))
    }

    // ── Configuration ──

    /// Define the absolute window and frame timestep; resets the interest
    /// window to the whole range and the position to its start
    pub fn set_absolute_times(&mut self, timestep: f64, start: f64, end: f64) -> Result<()> {
        if !(timestep > 0.0) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "frame timestep must be positive, got {}",
                timestep
            )));
        }
        if !(end > start) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "end time {} must be after start time {}",
                end, start
            )));
        }
        let total_frames = ((end - start) / timestep).round() as i64;
        if total_frames < 1 {
            return Err(StreamError::ConfigurationInvalid(format!(
                "window [{}, {}) is shorter than one frame of {}",
                start, end, timestep
            )));
        }

        self.timestep = timestep;
        self.absolute_start = start;
        self.absolute_end = end;
        self.total_frames = total_frames;
        self.start_frame = 0;
        self.end_frame = total_frames - 1;
        self.window_start = start;
        self.window_end = end;
        self.rewind();
        Ok(())
    }

    /// Select the interest window `[start, end)`.
    ///
    /// Bounds are clamped into the absolute window and snapped to the nearest
    /// frame boundary. The position resets to the new start frame.
    pub fn time_window(&mut self, start: f64, end: f64) -> Result<()> {
        if !self.supports_windowing {
            return Err(StreamError::Unsupported(
                "time source does not support windowing".to_string(),
            ));
        }

        let start = start.clamp(self.absolute_start, self.absolute_end);
        let end = end.clamp(self.absolute_start, self.absolute_end);
        let start_frame = self.snap_to_boundary(start);
        let end_boundary = self.snap_to_boundary(end);
        if end_boundary <= start_frame {
            return Err(StreamError::ConfigurationInvalid(format!(
                "time window [{}, {}) contains no frame",
                start, end
            )));
        }

        self.start_frame = start_frame;
        self.end_frame = end_boundary - 1;
        self.window_start = self.frame_time(start_frame);
        self.window_end = self.frame_time(end_boundary).min(self.absolute_end);
        self.rewind();
        Ok(())
    }

    /// Restore the interest window to the whole absolute window
    pub fn reset_window(&mut self) {
        self.start_frame = 0;
        self.end_frame = self.total_frames - 1;
        self.window_start = self.absolute_start;
        self.window_end = self.absolute_end;
        self.rewind();
    }

    /// Set the next position by time, clamped into the interest window
    pub fn time(&mut self, time: f64) {
        let time = time.clamp(self.window_start, self.window_end);
        let frame = self.time_to_frame(time).clamp(self.start_frame, self.end_frame);
        self.next = ClockPosition { time, frame };
    }

    /// Set the next position by frame.
    ///
    /// `None` resets to the start of the interest window. With
    /// `relative_to_original` the frame counts from the absolute start,
    /// otherwise from the interest window start. Out-of-range frames clamp.
    pub fn frame(&mut self, frame: Option<i64>, relative_to_original: bool) {
        let Some(frame) = frame else {
            self.next = self.window_first();
            return;
        };
        let absolute = if relative_to_original {
            frame
        } else {
            self.start_frame.saturating_add(frame)
        };
        self.next = self.position_at(absolute.clamp(self.start_frame, self.end_frame));
    }

    /// Set the speed factor; negative plays backwards.
    ///
    /// Frame-driven modes round magnitudes above 1 to whole frames.
    pub fn speed(&mut self, factor: f64) {
        self.speed = if self.mode.is_frame_driven() && factor.abs() > 1.0 {
            factor.round()
        } else {
            factor
        };
    }

    pub fn set_fps(&mut self, fps: f64) -> Result<()> {
        if !(fps > 0.0) {
            return Err(StreamError::ConfigurationInvalid(format!(
                "fps must be positive, got {}",
                fps
            )));
        }
        self.fps = fps;
        Ok(())
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        // Re-apply the speed rule for the new mode.
        self.speed(self.speed);
        self.last_tick_ms = None;
    }

    /// Declare whether the underlying data supports arbitrary windows
    pub fn set_supports_windowing(&mut self, supported: bool) {
        self.supports_windowing = supported;
    }

    // ── Playback ──

    pub fn play(&mut self) {
        if self.finished {
            self.rewind();
        }
        self.state = ClockState::Running;
        self.last_tick_ms = None;
    }

    pub fn pause(&mut self) {
        self.state = ClockState::Paused;
    }

    /// Back to the start of the interest window, `Idle`
    pub fn reset(&mut self) {
        self.rewind();
        self.state = ClockState::Idle;
    }

    /// Promote the next position to current and compute the one after.
    ///
    /// Crossing the interest window either wraps (repeat) or clamps to the
    /// boundary, sets `finished` and pauses. A paused clock does not move.
    pub fn update(&mut self) -> Result<ClockPosition> {
        if self.state == ClockState::Paused {
            return Ok(self.current);
        }
        self.current = self.next;

        let (time, frame) = match self.mode {
            PlaybackMode::SingleStepTrigger | PlaybackMode::FrameBased => {
                let frame = self.current.frame.saturating_add(self.speed.floor() as i64);
                (self.frame_time(frame), frame)
            }
            PlaybackMode::TimeBased => {
                let time = self.current.time + (1000.0 / self.fps) * self.speed;
                (time, self.time_to_frame(time))
            }
            PlaybackMode::RealtimeBased => {
                let now = self.time_source.now_ms();
                let elapsed = now - self.last_tick_ms.unwrap_or(now);
                self.last_tick_ms = Some(now);
                let time = self.current.time + elapsed * self.speed;
                (time, self.time_to_frame(time))
            }
        };

        let past_end = if self.mode.is_frame_driven() {
            frame > self.end_frame
        } else {
            time >= self.window_end || frame > self.end_frame
        };
        let before_start = frame < self.start_frame;

        self.next = if past_end {
            self.hit_boundary(self.window_first(), self.window_last())
        } else if before_start {
            self.hit_boundary(self.window_last(), self.window_first())
        } else {
            ClockPosition { time, frame }
        };
        Ok(self.current)
    }

    fn hit_boundary(&mut self, wrap_to: ClockPosition, clamp_to: ClockPosition) -> ClockPosition {
        if self.repeat {
            wrap_to
        } else {
            self.finished = true;
            self.state = ClockState::Paused;
            clamp_to
        }
    }

    // ── Accessors ──

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    /// True when the last update hit a non-repeating boundary
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn total_frames(&self) -> i64 {
        self.total_frames
    }

    pub fn absolute_start(&self) -> f64 {
        self.absolute_start
    }

    pub fn absolute_end(&self) -> f64 {
        self.absolute_end
    }

    /// Start of the interest window
    pub fn start_time(&self) -> f64 {
        self.window_start
    }

    /// End of the interest window, exclusive
    pub fn end_time(&self) -> f64 {
        self.window_end
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    /// Last frame of the interest window, inclusive
    pub fn end_frame(&self) -> i64 {
        self.end_frame
    }

    pub fn current(&self) -> ClockPosition {
        self.current
    }

    pub fn current_time(&self) -> f64 {
        self.current.time
    }

    pub fn current_frame(&self) -> i64 {
        self.current.frame
    }

    pub fn next_time(&self) -> f64 {
        self.next.time
    }

    pub fn next_frame(&self) -> i64 {
        self.next.frame
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn supports_windowing(&self) -> bool {
        self.supports_windowing
    }

    // ── Frame arithmetic ──

    /// Time at which `frame` starts
    pub fn frame_time(&self, frame: i64) -> f64 {
        self.absolute_start + frame as f64 * self.timestep
    }

    /// Frame containing `time`, unclamped
    pub fn time_to_frame(&self, time: f64) -> i64 {
        ((time - self.absolute_start) / self.timestep + FRAME_EPSILON).floor() as i64
    }

    fn snap_to_boundary(&self, time: f64) -> i64 {
        (((time - self.absolute_start) / self.timestep).round() as i64).clamp(0, self.total_frames)
    }

    fn position_at(&self, frame: i64) -> ClockPosition {
        ClockPosition {
            time: self.frame_time(frame),
            frame,
        }
    }

    fn window_first(&self) -> ClockPosition {
        ClockPosition {
            time: self.window_start,
            frame: self.start_frame,
        }
    }

    fn window_last(&self) -> ClockPosition {
        self.position_at(self.end_frame)
    }

    fn rewind(&mut self) {
        let start = if self.speed < 0.0 {
            self.window_last()
        } else {
            self.window_first()
        };
        self.current = start;
        self.next = start;
        self.finished = false;
        self.last_tick_ms = None;
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(PlaybackMode::default())
    }
}

impl fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("frames", &(self.start_frame..=self.end_frame))
            .field("current", &self.current)
            .field("next", &self.next)
            .field("speed", &self.speed)
            .field("repeat", &self.repeat)
            .field("finished", &self.finished)
            .finish()
    }
}
