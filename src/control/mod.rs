//! Thread and stage control
//!
//! - [`ControlledThread`]: one worker thread looping over an attached step
//! - [`Lifecycle`]: the start/pause/stop component every stage carries

pub mod lifecycle;
pub mod state;
pub mod thread;

pub use lifecycle::Lifecycle;
pub use state::ControlState;
pub use thread::{ControlledThread, ThreadHandle};
