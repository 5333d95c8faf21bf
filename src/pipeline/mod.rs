//! Linear stage pipelines.
//!
//! Data flows through a chain of stages, each one's output slot aliasing the
//! next one's input:
//!
//! ```text
//! [BufferReader] ──► [MapFilter] ──► [BufferWriter]
//!      ▲                                   │
//!  source thread                      sink thread
//! ```
//!
//! # Design
//!
//! - **Type-checked wiring** - adjacent endpoints must carry the same payload
//!   type; a failed `push_back` leaves the chain untouched.
//! - **Synchronous ticks** - a tick calls every stage once, in order, so a
//!   stage sees its upstream's output from the same tick.
//! - **Dedicated thread** - in frame-based mode the pipeline ticks on its own
//!   [`ControlledThread`](crate::control::ControlledThread).

pub mod executor;

pub use executor::{Pipeline, PipelineBuilder, StageInfo, StepOutcome};
