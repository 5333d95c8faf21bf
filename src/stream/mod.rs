//! Stream values and the slots stages expose them through

pub mod data;
pub mod slot;

pub use data::{AnyStream, Payload, Stream, StreamContext, StreamType};
pub use slot::{DataSlot, Slot};
