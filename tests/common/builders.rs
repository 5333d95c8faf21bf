//! Test data builders for creating test objects

use std::sync::{Arc, Mutex};
use streamflow::filter::{shared, GeneratorFilter, MapFilter, SinkFilter};
use streamflow::playback::{PlaybackClock, PlaybackMode};
use streamflow::{SharedFilter, StreamError};

/// Builder for playback clocks over a simple absolute window
pub struct ClockBuilder {
    mode: PlaybackMode,
    timestep: f64,
    start: f64,
    end: f64,
    repeat: bool,
}

impl ClockBuilder {
    pub fn new() -> Self {
        Self {
            mode: PlaybackMode::FrameBased,
            timestep: 0.1,
            start: 0.0,
            end: 10.0,
            repeat: false,
        }
    }

    pub fn mode(mut self, mode: PlaybackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn range(mut self, timestep: f64, start: f64, end: f64) -> Self {
        self.timestep = timestep;
        self.start = start;
        self.end = end;
        self
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn build(self) -> PlaybackClock {
        let mut clock = PlaybackClock::new(self.mode);
        clock
            .set_absolute_times(self.timestep, self.start, self.end)
            .unwrap();
        clock.set_repeat(self.repeat);
        clock
    }
}

impl Default for ClockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generator emitting `1..=limit`
pub fn counter(name: &str, limit: u32) -> SharedFilter {
    let mut n = 0;
    shared(GeneratorFilter::new(name, move || {
        n += 1;
        Ok((n <= limit).then_some(n))
    }))
}

/// Map stage that reports end of stream on its `stop_at`-th call
pub fn stopping_map(name: &str, stop_at: u32, calls: Arc<Mutex<u32>>) -> SharedFilter {
    shared(MapFilter::new(name, move |i: &u32, o: &mut u32| {
        let mut calls = calls.lock().unwrap();
        *calls += 1;
        if *calls == stop_at {
            return Err(StreamError::EndOfStream);
        }
        *o = *i;
        Ok(())
    }))
}

/// Sink stage recording everything it receives
pub fn recorder<T>(name: &str) -> (SharedFilter, Arc<Mutex<Vec<T>>>)
where
    T: Clone + Default + Send + Sync + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let sink: SharedFilter = shared(SinkFilter::new(name, move |value: &T| {
        sink_seen.lock().unwrap().push(value.clone());
        Ok(())
    }));
    (sink, seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_builder() {
        let clock = ClockBuilder::new().range(1.0, 0.0, 5.0).repeat(true).build();

        assert_eq!(clock.total_frames(), 5);
        assert!(clock.repeat());
        assert_eq!(clock.mode(), PlaybackMode::FrameBased);
    }
}
