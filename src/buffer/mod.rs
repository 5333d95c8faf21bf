//! Bounded buffers decoupling stages that run on different threads.
//!
//! ```text
//! [producer thread] --write--> [RingBuffer<T>] --read/advance--> [consumer thread]
//!                          ^                             ^
//!                  write Interruption            read Interruption
//! ```
//!
//! Every blocking call accepts an optional [`Interruption`] created by the
//! same buffer; signalling it makes the blocked call fail with
//! [`StreamError::Interrupted`](crate::error::StreamError::Interrupted).

pub mod interruption;
pub mod ring;

pub use interruption::{Interruption, WaitSide};
pub use ring::{ReadSlot, RingBuffer, WriteSlot};
