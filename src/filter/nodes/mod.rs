//! Closure-backed stages for building chains without a dedicated type
//!
//! - [`GeneratorFilter`] - produces values; `None` ends the stream
//! - [`MapFilter`] - transforms input into output
//! - [`SinkFilter`] - consumes input, no output

pub mod generator;
pub mod map;
pub mod sink;

pub use generator::GeneratorFilter;
pub use map::MapFilter;
pub use sink::SinkFilter;
