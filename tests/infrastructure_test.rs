//! Test to verify test infrastructure works correctly

mod common;

use common::builders::{counter, ClockBuilder};
use common::mock_helpers::scripted_time;
use streamflow::playback::{PlaybackMode, TimeSource};

#[test]
fn test_infrastructure_setup() {
    // Test that builders work
    let clock = ClockBuilder::new()
        .mode(PlaybackMode::SingleStepTrigger)
        .range(0.5, 1.0, 3.0)
        .build();

    assert_eq!(clock.mode(), PlaybackMode::SingleStepTrigger);
    assert_eq!(clock.total_frames(), 4);
    common::assert_float_eq(clock.absolute_start(), 1.0, 1e-9);

    let stage = counter("count", 3);
    assert_eq!(stage.lock().unwrap().name(), "count");
}

#[test]
fn test_scripted_time_repeats_last_value() {
    let time = scripted_time(vec![1.0, 2.0]);
    assert_eq!(time.now_ms(), 1.0);
    assert_eq!(time.now_ms(), 2.0);
    assert_eq!(time.now_ms(), 2.0);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
