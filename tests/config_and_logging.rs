//! Integration tests for config files and the injected logger
//!
//! These tests validate:
//! - Saving and loading TOML and JSON config files
//! - Falling back to defaults on unreadable files
//! - Stage failures reaching the pipeline's logger

mod common;

use common::builders::counter;
use common::mock_helpers::MockSink;
use std::sync::Arc;
use streamflow::config::{AppConfig, LogFormat, TimeWindow};
use streamflow::filter::{shared, SinkFilter};
use streamflow::logging::{LogLevel, MemorySink};
use streamflow::pipeline::Pipeline;
use streamflow::playback::{PlaybackClock, PlaybackMode};
use streamflow::StreamError;
use tempfile::TempDir;

fn sample_config() -> AppConfig {
    let mut config = AppConfig::new("projection");
    config.playback.mode = PlaybackMode::SingleStepTrigger;
    config.playback.window = Some(TimeWindow {
        start: 1.0,
        end: 4.0,
    });
    config.buffer.capacity = 16;
    config.logging.format = LogFormat::Json;
    config.source.values_per_frame = 8;
    config
}

#[test]
fn test_toml_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("streamflow.toml");
    let config = sample_config();

    config.save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[playback]"));
    assert!(text.contains("single_step_trigger"));

    assert_eq!(AppConfig::load(&path).unwrap(), config);
}

#[test]
fn test_json_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("streamflow.json");
    let config = sample_config();

    config.save(&path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["buffer"]["capacity"], 16);

    assert_eq!(AppConfig::load(&path).unwrap(), config);
}

#[test]
fn test_missing_or_broken_file_falls_back() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    let sink = MemorySink::new();
    assert!(matches!(AppConfig::load(&missing), Err(StreamError::Config(_))));
    assert_eq!(AppConfig::load_or_default(&missing, &sink), AppConfig::default());
    assert!(sink.contains(LogLevel::Warn, "absent.toml"));

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "[playback\nmode = 3").unwrap();
    assert!(AppConfig::load(&broken).is_err());
    assert_eq!(AppConfig::load_or_default(&broken, &sink), AppConfig::default());
    assert_eq!(sink.entries().len(), 2);
    assert!(sink.entries().iter().all(|e| e.component == "config"));
}

#[test]
fn test_loaded_config_drives_clock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("streamflow.toml");
    std::fs::write(
        &path,
        r#"
        name = "windowed"

        [playback]
        frame_timestep = 0.5
        end_time = 20.0
        window = { start = 5.0, end = 10.0 }
        "#,
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    config.validate().unwrap();
    let clock = PlaybackClock::from_settings(&config.playback).unwrap();
    assert_eq!(clock.total_frames(), 40);
    assert_eq!(clock.start_frame(), 10);
    assert_eq!(clock.end_frame(), 19);
}

#[test]
fn test_stage_failure_reaches_logger() {
    let mut sink = MockSink::new();
    sink.expect_log()
        .withf(|level, component, message| {
            *level == LogLevel::Error && component == "guarded" && message.contains("overflow")
        })
        .times(1)
        .return_const(());
    sink.expect_log()
        .withf(|level, _, _| *level != LogLevel::Error)
        .return_const(());

    let mut pipeline = Pipeline::builder("guarded")
        .mode(PlaybackMode::SingleStepTrigger)
        .logger(Arc::new(sink))
        .build();
    pipeline.push_back(counter("count", 10)).unwrap();
    pipeline
        .push_back(shared(SinkFilter::new("limit", |v: &u32| {
            if *v > 2 {
                Err(StreamError::stage("limit", "overflow"))
            } else {
                Ok(())
            }
        })))
        .unwrap();

    pipeline.start().unwrap();
    pipeline.step().unwrap();
    pipeline.step().unwrap();
    let err = pipeline.step().unwrap_err();
    assert!(err.to_string().contains("limit"));
    assert!(pipeline.state().is_stopped());
}
