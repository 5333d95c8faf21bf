//! One-shot cancellation tokens for blocking buffer waits.
//!
//! A token is bound to one side (readers or writers) of one buffer. Signalling
//! it wakes every waiter on that side; only a wait that was handed this token
//! observes the flag, and consuming it resets the token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which condition of a buffer a wait blocks on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSide {
    /// Waiting for data to read
    Read,
    /// Waiting for room to write
    Write,
}

/// Implemented by the shared core of a buffer so tokens can wake its waiters.
///
/// Implementations must take the buffer lock before notifying, otherwise a
/// waiter that checked the flag but has not parked yet would miss the wake-up.
pub(crate) trait WakeTarget: Send + Sync {
    fn wake(&self, side: WaitSide);
}

/// Cancellation handle for a blocking `read`/`write` on a buffer.
///
/// Clones share the same flag, so a stage can keep one copy for its blocking
/// calls and hand another to whoever has to cancel them.
#[derive(Clone)]
pub struct Interruption {
    flag: Arc<AtomicBool>,
    target: Arc<dyn WakeTarget>,
    side: WaitSide,
    buffer_id: u64,
}

impl Interruption {
    pub(crate) fn new(target: Arc<dyn WakeTarget>, side: WaitSide, buffer_id: u64) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            target,
            side,
            buffer_id,
        }
    }

    /// Abandon the wait currently (or next) blocked with this token.
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.target.wake(self.side);
    }

    /// Whether a signal is pending
    pub fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Drop a pending signal without firing it
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn side(&self) -> WaitSide {
        self.side
    }

    /// Take the pending signal. Called by waits with the buffer lock held.
    pub(crate) fn consume(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn buffer_id(&self) -> u64 {
        self.buffer_id
    }
}

impl fmt::Debug for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interruption")
            .field("side", &self.side)
            .field("buffer_id", &self.buffer_id)
            .field("signalled", &self.is_signalled())
            .finish()
    }
}
