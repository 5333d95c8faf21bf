//! A worker thread running an attached step in a start/pause/stop loop.
//!
//! The worker is spawned lazily by the first `start()` and lives until the
//! [`ControlledThread`] is dropped. Between iterations it parks on a condition
//! variable whenever the commanded state is not `Started`, and reports itself
//! as suspended so callers can synchronise with [`ControlledThread::wait_for_suspend`].
//!
//! Commands never interrupt a step in flight. A step parked in a blocking call
//! is released by the cancellation hook, which the owner wires to the
//! interruption tokens the step waits with.

use super::state::ControlState;
use crate::error::{Result, StreamError};
use crate::logging::{default_logger, Logger};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

type StepFn = Box<dyn FnMut() + Send>;
type CancelFn = Arc<dyn Fn() + Send + Sync>;

struct ControlInner {
    state: ControlState,
    /// Worker is parked between iterations (or absent)
    suspended: bool,
    attached: bool,
    /// Taken by the worker when it is spawned
    step: Option<StepFn>,
    cancel: Option<CancelFn>,
    join: Option<JoinHandle<()>>,
    worker: Option<ThreadId>,
    exit: bool,
    panicked: bool,
    iterations: u64,
}

struct Control {
    name: String,
    inner: Mutex<ControlInner>,
    /// Worker waits here for commands
    command: Condvar,
    /// Observers wait here for the worker to park
    report: Condvar,
    logger: Logger,
}

impl Control {
    fn lock(&self) -> MutexGuard<'_, ControlInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.command.notify_all();
        self.report.notify_all();
    }

    fn start(self: &Arc<Self>) -> Result<()> {
        let mut inner = self.lock();
        if inner.exit {
            return Err(StreamError::InvalidState(format!(
                "thread '{}' has been shut down",
                self.name
            )));
        }
        if !inner.attached {
            drop(inner);
            panic!(
                "ControlledThread '{}' started before a step was attached",
                self.name
            );
        }

        inner.state = ControlState::Started;
        if inner.join.is_none() {
            let step = inner.step.take().ok_or_else(|| {
                StreamError::InvalidState(format!("thread '{}' lost its step", self.name))
            })?;
            let control = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || control.run(step))?;
            inner.worker = Some(handle.thread().id());
            inner.join = Some(handle);
            self.logger.debug(&self.name, "worker spawned");
        }
        inner.suspended = false;
        drop(inner);

        self.notify();
        Ok(())
    }

    fn command(&self, state: ControlState) {
        let mut inner = self.lock();
        inner.state = state;
        drop(inner);
        self.notify();
    }

    fn is_worker(&self, inner: &ControlInner) -> bool {
        inner.worker == Some(thread::current().id())
    }

    fn wait_until(&self, mut inner: MutexGuard<'_, ControlInner>, done: impl Fn(&ControlInner) -> bool) {
        if inner.join.is_none() || self.is_worker(&inner) {
            return;
        }
        while !done(&inner) {
            inner = self.report.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn run(self: Arc<Self>, mut step: StepFn) {
        loop {
            {
                let mut inner = self.lock();
                while inner.state != ControlState::Started && !inner.exit {
                    if !inner.suspended {
                        inner.suspended = true;
                        self.report.notify_all();
                    }
                    inner = self.command.wait(inner).unwrap_or_else(|e| e.into_inner());
                }
                if inner.exit {
                    inner.suspended = true;
                    self.report.notify_all();
                    break;
                }
                inner.suspended = false;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| step()));

            let mut inner = self.lock();
            match outcome {
                Ok(()) => inner.iterations += 1,
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    inner.panicked = true;
                    inner.state = ControlState::Stopped;
                    drop(inner);
                    self.logger
                        .error(&self.name, &format!("step panicked, stopping: {}", message));
                }
            }
        }
        self.logger.debug(&self.name, "worker exiting");
    }
}

/// Owner of one worker thread.
///
/// # Panics
///
/// [`attach`](Self::attach) panics when a step is already attached and
/// [`start`](Self::start) panics when none is. Both are programming errors.
pub struct ControlledThread {
    control: Arc<Control>,
}

impl ControlledThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_logger(name, default_logger())
    }

    pub fn with_logger(name: impl Into<String>, logger: Logger) -> Self {
        Self {
            control: Arc::new(Control {
                name: name.into(),
                inner: Mutex::new(ControlInner {
                    state: ControlState::Stopped,
                    suspended: true,
                    attached: false,
                    step: None,
                    cancel: None,
                    join: None,
                    worker: None,
                    exit: false,
                    panicked: false,
                    iterations: 0,
                }),
                command: Condvar::new(),
                report: Condvar::new(),
                logger,
            }),
        }
    }

    /// Bind the callable run once per iteration
    pub fn attach<F>(&self, step: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.bind(Box::new(step), None);
    }

    /// Bind the step and a hook that unblocks it on shutdown
    pub fn attach_with_cancel<F, C>(&self, step: F, cancel: C)
    where
        F: FnMut() + Send + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.bind(Box::new(step), Some(Arc::new(cancel)));
    }

    fn bind(&self, step: StepFn, cancel: Option<CancelFn>) {
        let mut inner = self.control.lock();
        if inner.attached {
            drop(inner);
            panic!(
                "ControlledThread '{}' already has a step attached",
                self.control.name
            );
        }
        inner.attached = true;
        inner.step = Some(step);
        inner.cancel = cancel;
    }

    pub fn is_attached(&self) -> bool {
        self.control.lock().attached
    }

    /// Run iterations, spawning the worker on first use
    pub fn start(&self) -> Result<()> {
        self.control.start()
    }

    /// Let the current iteration finish, then park
    pub fn pause(&self) {
        self.control.command(ControlState::Paused);
    }

    /// Let the current iteration finish, then park in `Stopped`
    pub fn stop(&self) {
        self.control.command(ControlState::Stopped);
    }

    /// Block until the worker is parked between iterations
    pub fn wait_for_suspend(&self) {
        let inner = self.control.lock();
        self.control.wait_until(inner, |i| i.suspended);
    }

    /// Block until the worker is parked in `Stopped`
    pub fn wait_for_stop(&self) {
        let inner = self.control.lock();
        self.control
            .wait_until(inner, |i| i.suspended && i.state == ControlState::Stopped);
    }

    /// Command `Stopped` and wait for the worker to park, without releasing
    /// the lock in between
    pub fn stop_and_wait(&self) {
        let mut inner = self.control.lock();
        inner.state = ControlState::Stopped;
        self.control.notify();
        self.control
            .wait_until(inner, |i| i.suspended && i.state == ControlState::Stopped);
    }

    pub fn state(&self) -> ControlState {
        self.control.lock().state
    }

    pub fn is_suspended(&self) -> bool {
        self.control.lock().suspended
    }

    /// Whether the OS thread has been spawned
    pub fn is_spawned(&self) -> bool {
        self.control.lock().join.is_some()
    }

    /// Whether a step panicked and stopped the loop
    pub fn panicked(&self) -> bool {
        self.control.lock().panicked
    }

    /// Completed iterations
    pub fn iterations(&self) -> u64 {
        self.control.lock().iterations
    }

    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// Non-owning handle for commanding this thread from elsewhere
    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle {
            control: Arc::clone(&self.control),
        }
    }
}

impl Drop for ControlledThread {
    fn drop(&mut self) {
        let (cancel, join) = {
            let mut inner = self.control.lock();
            inner.exit = true;
            inner.state = ControlState::Stopped;
            // The step may hold a handle to this control; release it.
            inner.step = None;
            (inner.cancel.take(), inner.join.take())
        };
        self.control.notify();

        if let Some(cancel) = cancel {
            cancel();
        }
        if let Some(join) = join {
            if join.thread().id() == thread::current().id() {
                return;
            }
            if join.join().is_err() {
                self.control
                    .logger
                    .error(&self.control.name, "worker terminated abnormally");
            }
        }
    }
}

impl fmt::Debug for ControlledThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.control.lock();
        f.debug_struct("ControlledThread")
            .field("name", &self.control.name)
            .field("state", &inner.state)
            .field("suspended", &inner.suspended)
            .field("spawned", &inner.join.is_some())
            .finish()
    }
}

/// Clonable command handle for a [`ControlledThread`].
///
/// Does not keep the worker alive: once the owner is dropped, `start` fails
/// and the other commands do nothing.
#[derive(Clone)]
pub struct ThreadHandle {
    control: Arc<Control>,
}

impl ThreadHandle {
    pub fn start(&self) -> Result<()> {
        self.control.start()
    }

    pub fn pause(&self) {
        self.control.command(ControlState::Paused);
    }

    pub fn stop(&self) {
        self.control.command(ControlState::Stopped);
    }

    pub fn wait_for_suspend(&self) {
        let inner = self.control.lock();
        self.control.wait_until(inner, |i| i.suspended);
    }

    pub fn wait_for_stop(&self) {
        let inner = self.control.lock();
        self.control
            .wait_until(inner, |i| i.suspended && i.state == ControlState::Stopped);
    }

    pub fn state(&self) -> ControlState {
        self.control.lock().state
    }

    pub fn name(&self) -> &str {
        &self.control.name
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.control.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::null_logger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_thread() -> (ControlledThread, Arc<AtomicUsize>) {
        let thread = ControlledThread::with_logger("counter", null_logger());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        thread.attach(move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
        });
        (thread, count)
    }

    #[test]
    fn test_drop_without_start() {
        let (thread, count) = counting_thread();
        assert!(!thread.is_spawned());
        drop(thread);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_pause_start_stop() {
        let (thread, count) = counting_thread();
        thread.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        thread.pause();
        thread.wait_for_suspend();
        let paused_at = count.load(Ordering::SeqCst);
        assert!(paused_at > 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), paused_at);

        thread.start().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        thread.stop_and_wait();
        assert_eq!(thread.state(), ControlState::Stopped);
        assert!(thread.is_suspended());
        assert!(count.load(Ordering::SeqCst) > paused_at);
    }

    #[test]
    fn test_wait_without_worker_returns() {
        let (thread, _) = counting_thread();
        thread.wait_for_suspend();
        thread.wait_for_stop();
    }

    #[test]
    #[should_panic(expected = "before a step was attached")]
    fn test_start_without_attach_panics() {
        let thread = ControlledThread::with_logger("empty", null_logger());
        let _ = thread.start();
    }

    #[test]
    #[should_panic(expected = "already has a step attached")]
    fn test_double_attach_panics() {
        let (thread, _) = counting_thread();
        thread.attach(|| {});
    }

    #[test]
    fn test_panicking_step_stops_loop() {
        let thread = ControlledThread::with_logger("panicky", null_logger());
        thread.attach(|| panic!("boom"));
        thread.start().unwrap();
        thread.wait_for_stop();
        assert!(thread.panicked());
        assert_eq!(thread.state(), ControlState::Stopped);
    }

    #[test]
    fn test_cancel_hook_runs_on_drop() {
        let thread = ControlledThread::with_logger("cancel", null_logger());
        let cancelled = Arc::new(AtomicUsize::new(0));
        let c = cancelled.clone();
        thread.attach_with_cancel(|| std::thread::sleep(Duration::from_millis(1)), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        thread.start().unwrap();
        drop(thread);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_commands_thread() {
        let (thread, count) = counting_thread();
        let handle = thread.handle();
        handle.start().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        handle.stop();
        handle.wait_for_stop();
        assert!(count.load(Ordering::SeqCst) > 0);
        assert_eq!(handle.state(), ControlState::Stopped);

        drop(thread);
        assert!(handle.start().is_err());
    }
}
