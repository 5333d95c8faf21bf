//! # streamflow: typed streaming pipelines
//!
//! A framework for chaining processing stages over typed data streams, with
//! producer/consumer decoupling through bounded buffers and stages that can run
//! on their own threads.
//!
//! ## Architecture
//!
//! - **Buffer**: bounded ring buffer with cancellable blocking reads and writes
//! - **Control**: worker threads with start/pause/stop commands, stage lifecycles
//! - **Stream**: named, shared payload cells and the slots stages expose them by
//! - **Filter**: the stage trait plus buffer reader/writer and closure stages
//! - **Pipeline**: linear chain of stages, wiring checks and the tick loop
//! - **Playback**: clock mapping simulation time to frame numbers
//!
//! ## Configuration
//!
//! Runs are described by [`AppConfig`], stored as TOML in the platform config
//! directory under `streamflow-rs` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use streamflow::filter::{shared, GeneratorFilter, MapFilter};
//! use streamflow::pipeline::Pipeline;
//! use streamflow::playback::PlaybackMode;
//!
//! let mut pipeline = Pipeline::builder("demo")
//!     .mode(PlaybackMode::SingleStepTrigger)
//!     .build();
//! let mut n = 0;
//! pipeline.push_back(shared(GeneratorFilter::new("count", move || {
//!     n += 1;
//!     Ok((n <= 10).then_some(n))
//! })))?;
//! pipeline.push_back(shared(MapFilter::new("square", |i: &u32, o: &mut u32| {
//!     *o = i * i;
//!     Ok(())
//! })))?;
//!
//! pipeline.start()?;
//! while pipeline.step()? != StepOutcome::EndOfStream {}
//! ```

pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pipeline;
pub mod playback;
pub mod stream;

// Re-export commonly used types
pub use buffer::{Interruption, RingBuffer};
pub use config::AppConfig;
pub use control::{ControlState, ControlledThread, Lifecycle};
pub use error::{Result, ResultExt, StreamError};
pub use filter::{Filter, FilterBase, SharedFilter};
pub use logging::{LogLevel, LogSink, Logger};
pub use pipeline::{Pipeline, StepOutcome};
pub use playback::{PlaybackClock, PlaybackMode};
pub use stream::{AnyStream, DataSlot, Slot, Stream, StreamContext};
