//! Start/pause/stop component shared between a stage and its pipeline.
//!
//! A [`Lifecycle`] is what the pipeline commands instead of the stage itself:
//! the stage may be busy inside `process()` on another thread, so commands
//! must not need the stage lock. Stopping signals every registered
//! interruption token, which releases a `process()` parked in a buffer wait.

use super::state::ControlState;
use super::thread::ThreadHandle;
use crate::buffer::Interruption;
use crate::error::Result;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct LifecycleInner {
    state: ControlState,
    tokens: Vec<Interruption>,
    threads: Vec<ThreadHandle>,
}

/// Clonable lifecycle handle; clones share state
#[derive(Clone, Default)]
pub struct Lifecycle {
    inner: Arc<Mutex<LifecycleInner>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a token signalled on stop and reset on start
    pub fn watch(&self, token: Interruption) {
        self.lock().tokens.push(token);
    }

    /// Register a thread commanded along with this lifecycle
    pub fn drive(&self, thread: ThreadHandle) {
        self.lock().threads.push(thread);
    }

    pub fn state(&self) -> ControlState {
        self.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    pub fn is_stopped(&self) -> bool {
        self.state().is_stopped()
    }

    pub fn start(&self) -> Result<()> {
        let threads = {
            let mut inner = self.lock();
            inner.state = ControlState::Started;
            for token in &inner.tokens {
                token.reset();
            }
            inner.threads.clone()
        };
        for thread in &threads {
            thread.start()?;
        }
        Ok(())
    }

    pub fn pause(&self) {
        let threads = {
            let mut inner = self.lock();
            inner.state = ControlState::Paused;
            inner.threads.clone()
        };
        for thread in &threads {
            thread.pause();
        }
    }

    /// Command `Stopped` and release any wait on the registered tokens.
    /// Does not block.
    pub fn stop(&self) {
        let (threads, tokens) = {
            let mut inner = self.lock();
            inner.state = ControlState::Stopped;
            (inner.threads.clone(), inner.tokens.clone())
        };
        for thread in &threads {
            thread.stop();
        }
        for token in &tokens {
            token.signal();
        }
    }

    /// Signal the tokens without changing state
    pub fn cancel(&self) {
        let tokens = self.lock().tokens.clone();
        for token in &tokens {
            token.signal();
        }
    }

    /// Block until every driven thread is parked
    pub fn wait_for_suspend(&self) {
        let threads = self.lock().threads.clone();
        for thread in &threads {
            thread.wait_for_suspend();
        }
    }

    /// Whether both handles refer to the same lifecycle
    pub fn same_as(&self, other: &Lifecycle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Lifecycle")
            .field("state", &inner.state)
            .field("tokens", &inner.tokens.len())
            .field("threads", &inner.threads.len())
            .finish()
    }
}
