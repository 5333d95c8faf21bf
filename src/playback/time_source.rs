//! Time providers for realtime playback

use std::sync::Mutex;
use std::time::Instant;

/// Monotonic millisecond clock consumed by [`PlaybackClock`](super::PlaybackClock)
pub trait TimeSource: Send + Sync {
    /// Milliseconds since an arbitrary, fixed origin
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Mutex::new(start_ms),
        }
    }

    pub fn advance(&self, ms: f64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += ms;
    }

    pub fn set(&self, ms: f64) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = ms;
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
