//! Property tests for the playback clock
//!
//! These tests validate:
//! - Seeking always lands inside the interest window
//! - Window selection snaps to frame boundaries
//! - Frame-driven playback visits every frame once, or wraps with repeat
//! - Realtime playback follows an injected time source

mod common;

use common::assert_float_eq;
use common::builders::ClockBuilder;
use common::mock_helpers::scripted_time;
use proptest::prelude::*;
use std::sync::Arc;
use streamflow::config::{PlaybackSettings, TimeWindow};
use streamflow::playback::{ClockState, PlaybackClock, PlaybackMode};
use streamflow::StreamError;

proptest! {
    #[test]
    fn prop_seek_by_time_stays_in_window(
        start in 0.0f64..5.0,
        len in 1.0f64..5.0,
        target in -100.0f64..100.0,
    ) {
        let mut clock = ClockBuilder::new().range(0.1, 0.0, 10.0).build();
        clock.time_window(start, start + len).unwrap();

        clock.time(target);
        prop_assert!(clock.next_time() >= clock.start_time());
        prop_assert!(clock.next_time() <= clock.end_time());
        prop_assert!(clock.next_frame() >= clock.start_frame());
        prop_assert!(clock.next_frame() <= clock.end_frame());
    }

    #[test]
    fn prop_seek_by_frame_clamps(frame in -1000i64..1000, relative in any::<bool>()) {
        let mut clock = ClockBuilder::new().range(0.1, 0.0, 10.0).build();
        clock.time_window(2.0, 7.0).unwrap();

        clock.frame(Some(frame), relative);
        let expected = if relative { frame } else { 20 + frame }.clamp(20, 69);
        prop_assert_eq!(clock.next_frame(), expected);
        prop_assert!((clock.next_time() - clock.frame_time(expected)).abs() < 1e-9);
    }

    #[test]
    fn prop_window_snaps_to_frame_boundaries(a in 0.0f64..10.0, b in 0.0f64..10.0) {
        let mut clock = ClockBuilder::new().range(0.5, 0.0, 10.0).build();
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        match clock.time_window(lo, hi) {
            Ok(()) => {
                let frames = clock.start_time() / 0.5;
                prop_assert!((frames - frames.round()).abs() < 1e-9);
                prop_assert!(clock.start_frame() <= clock.end_frame());
                prop_assert!(clock.end_frame() < clock.total_frames());
                prop_assert_eq!(clock.current_frame(), clock.start_frame());
            }
            Err(e) => prop_assert!(matches!(e, StreamError::ConfigurationInvalid(_))),
        }
    }

    #[test]
    fn prop_frame_playback_visits_every_frame(frames in 1i64..60) {
        let mut clock = ClockBuilder::new().range(1.0, 0.0, frames as f64).build();
        clock.play();

        let mut visited = Vec::new();
        while !clock.finished() {
            visited.push(clock.update().unwrap().frame);
        }
        prop_assert_eq!(visited, (0..frames).collect::<Vec<_>>());
        prop_assert_eq!(clock.state(), ClockState::Paused);
    }
}

#[test]
fn test_repeat_wraps_to_window_start() {
    let mut clock = ClockBuilder::new()
        .range(1.0, 0.0, 10.0)
        .repeat(true)
        .build();
    clock.time_window(3.0, 6.0).unwrap();
    clock.play();

    let frames: Vec<i64> = (0..7).map(|_| clock.update().unwrap().frame).collect();
    assert_eq!(frames, vec![3, 4, 5, 3, 4, 5, 3]);
    assert!(!clock.finished());
}

#[test]
fn test_reverse_speed_walks_backwards() {
    let mut clock = ClockBuilder::new().range(1.0, 0.0, 4.0).build();
    clock.speed(-1.0);
    clock.reset();
    clock.play();

    let frames: Vec<i64> = (0..4).map(|_| clock.update().unwrap().frame).collect();
    assert_eq!(frames, vec![3, 2, 1, 0]);
    assert!(clock.finished());
}

#[test]
fn test_play_after_finish_rewinds() {
    let mut clock = ClockBuilder::new().range(1.0, 0.0, 2.0).build();
    clock.play();
    clock.update().unwrap();
    clock.update().unwrap();
    assert!(clock.finished());

    clock.play();
    assert!(!clock.finished());
    assert_eq!(clock.update().unwrap().frame, 0);
}

#[test]
fn test_realtime_follows_time_source() {
    let time = Arc::new(scripted_time(vec![0.0, 40.0, 90.0]));
    let mut clock = PlaybackClock::with_time_source(PlaybackMode::RealtimeBased, time);
    clock.set_absolute_times(10.0, 0.0, 1000.0).unwrap();
    clock.play();

    clock.update().unwrap();
    assert_float_eq(clock.next_time(), 0.0, 1e-9);
    clock.update().unwrap();
    assert_float_eq(clock.next_time(), 40.0, 1e-9);
    assert_eq!(clock.next_frame(), 4);

    let current = clock.update().unwrap();
    assert_float_eq(current.time, 40.0, 1e-9);
    assert_float_eq(clock.next_time(), 90.0, 1e-9);
    assert_eq!(clock.next_frame(), 9);
}

#[test]
fn test_realtime_speed_scales_elapsed_time() {
    let time = Arc::new(scripted_time(vec![100.0, 150.0]));
    let mut clock = PlaybackClock::with_time_source(PlaybackMode::RealtimeBased, time);
    clock.set_absolute_times(10.0, 0.0, 1000.0).unwrap();
    clock.speed(2.5);
    clock.play();

    clock.update().unwrap();
    clock.update().unwrap();
    assert_float_eq(clock.next_time(), 125.0, 1e-9);
    assert_eq!(clock.next_frame(), 12);
}

#[test]
fn test_from_settings_applies_window() {
    let settings = PlaybackSettings {
        mode: PlaybackMode::FrameBased,
        frame_timestep: 0.1,
        start_time: 0.0,
        end_time: 10.0,
        window: Some(TimeWindow {
            start: 2.0,
            end: 7.0,
        }),
        ..Default::default()
    };
    let clock = PlaybackClock::from_settings(&settings).unwrap();

    assert_eq!(clock.total_frames(), 100);
    assert_eq!(clock.start_frame(), 20);
    assert_eq!(clock.end_frame(), 69);
    assert_float_eq(clock.end_time(), 7.0, 1e-9);
}

#[test]
fn test_windowing_can_be_disabled() {
    let mut clock = ClockBuilder::new().build();
    clock.set_supports_windowing(false);
    assert!(matches!(
        clock.time_window(1.0, 2.0),
        Err(StreamError::Unsupported(_))
    ));
}
