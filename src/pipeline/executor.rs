//! Pipeline executor: stage chain, wiring and the tick loop.
//!
//! Each tick calls `process()` on every stage in append order:
//! 1. `Interrupted` / `StreamInterrupted` abort the rest of the tick.
//! 2. `EndOfStream` stops every stage and marks the pipeline `Stopped`.
//! 3. Any other error is logged, stops the pipeline and is returned.
//! 4. After a full tick an attached clock advances; a finished clock pauses
//!    the pipeline.
//!
//! In single-step mode the caller drives ticks with [`Pipeline::step`]. In
//! frame-based mode the pipeline's own [`ControlledThread`] does.
//!
//! Stages are never locked to command them. Each stage's [`Lifecycle`] is
//! collected at `push_back`, and stopping goes through it so a stage blocked
//! inside `process()` on the frame thread is released by its tokens.

use crate::control::{ControlState, ControlledThread, Lifecycle, ThreadHandle};
use crate::error::{Result, ResultExt, StreamError};
use crate::filter::{Filter, SharedFilter};
use crate::logging::{default_logger, Logger};
use crate::playback::{PlaybackMode, SharedClock};
use crate::stream::{AnyStream, Stream};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every stage processed
    Completed,
    /// A stage aborted the tick; the pipeline keeps its state
    Interrupted,
    /// A stage reported the end of the stream; the pipeline is stopped
    EndOfStream,
    /// The attached clock reached the end of its window; the pipeline is paused
    Finished,
}

/// Read-only description of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub name: String,
    pub input: Option<&'static str>,
    pub output: Option<&'static str>,
    pub connected: bool,
    pub state: ControlState,
}

fn lock_stage(filter: &SharedFilter) -> MutexGuard<'_, dyn Filter + 'static> {
    filter.lock().unwrap_or_else(|e| e.into_inner())
}

fn same_stage(a: &SharedFilter, b: &SharedFilter) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Connect `next` after `prev` following the wiring rule.
///
/// Types are checked before anything is connected.
fn wire(prev: &mut dyn Filter, next: &mut dyn Filter) -> Result<()> {
    let (Some(output), Some(input)) = (prev.output(), next.input()) else {
        return Err(StreamError::ConfigurationInvalid(format!(
            "cannot connect '{}' to '{}': missing output or input slot",
            prev.name(),
            next.name()
        )));
    };
    output.stream_type().ensure_matches(&input.stream_type())?;
    let output_handle = output.handle();
    let input_handle = input.handle();

    if let Some(handle) = output_handle {
        let name = next.name().to_string();
        next.input_mut()
            .ok_or_else(|| StreamError::ConfigurationInvalid(format!("'{}' has no mutable input", name)))?
            .connect(&handle)
    } else if let Some(handle) = input_handle {
        let name = prev.name().to_string();
        prev.output_mut()
            .ok_or_else(|| StreamError::ConfigurationInvalid(format!("'{}' has no mutable output", name)))?
            .connect(&handle)
    } else {
        Err(StreamError::ConfigurationInvalid(format!(
            "neither '{}' output nor '{}' input is connected",
            prev.name(),
            next.name()
        )))
    }
}

struct StageEntry {
    name: String,
    filter: SharedFilter,
    lifecycle: Lifecycle,
}

#[derive(Default)]
struct ConfigCache {
    cached: Option<bool>,
    was_valid: bool,
}

struct PipelineCore {
    name: String,
    stages: RwLock<Vec<StageEntry>>,
    state: Mutex<ControlState>,
    state_changed: Condvar,
    mode: Mutex<PlaybackMode>,
    clock: Mutex<Option<SharedClock>>,
    configured: Mutex<ConfigCache>,
    /// `on_start` ran and `on_stop` has not yet
    hooks_pending: AtomicBool,
    end_of_stream: AtomicBool,
    ticks: AtomicU64,
    /// Commands for the frame thread, issued before the state is published
    frames: ThreadHandle,
    logger: Logger,
}

impl PipelineCore {
    fn state(&self) -> ControlState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ControlState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.state_changed.notify_all();
    }

    fn mode(&self) -> PlaybackMode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clock(&self) -> Option<SharedClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn snapshot(&self) -> Vec<(String, SharedFilter)> {
        self.stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.filter)))
            .collect()
    }

    fn lifecycles(&self) -> Vec<Lifecycle> {
        self.stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|entry| entry.lifecycle.clone())
            .collect()
    }

    fn invalidate(&self) {
        *self.configured.lock().unwrap_or_else(|e| e.into_inner()) = ConfigCache::default();
    }

    fn tick(&self) -> Result<StepOutcome> {
        for (name, filter) in self.snapshot() {
            if !self.state().is_started() {
                return Ok(StepOutcome::Interrupted);
            }
            let result = lock_stage(&filter).process();
            let Err(e) = result else { continue };

            if e.is_recoverable() {
                self.logger
                    .trace(&self.name, &format!("tick aborted by '{}': {}", name, e));
                return Ok(StepOutcome::Interrupted);
            }
            if e.is_end_of_stream() {
                self.logger
                    .info(&self.name, &format!("end of stream reported by '{}'", name));
                self.end_of_stream.store(true, Ordering::SeqCst);
                self.halt();
                return Ok(StepOutcome::EndOfStream);
            }
            self.logger
                .error(&self.name, &format!("stage '{}' failed, stopping: {}", name, e));
            self.halt();
            return Err(e.with_context(format!("stage '{}'", name)));
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);

        if let Some(clock) = self.clock() {
            let mut clock = clock.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = clock.update() {
                drop(clock);
                self.logger
                    .error(&self.name, &format!("clock update failed, stopping: {}", e));
                self.halt();
                return Err(e);
            }
            if clock.finished() {
                drop(clock);
                self.logger.info(&self.name, "playback finished, pausing");
                self.pause_stages();
                return Ok(StepOutcome::Finished);
            }
        }
        Ok(StepOutcome::Completed)
    }

    /// Stop everything without waiting; safe from the frame thread.
    fn halt(&self) {
        self.frames.stop();
        self.set_state(ControlState::Stopped);
        for lifecycle in self.lifecycles() {
            lifecycle.stop();
        }
        self.run_stop_hooks();
    }

    fn pause_stages(&self) {
        self.frames.pause();
        self.set_state(ControlState::Paused);
        for lifecycle in self.lifecycles() {
            lifecycle.pause();
        }
    }

    fn run_stop_hooks(&self) {
        if !self.hooks_pending.swap(false, Ordering::SeqCst) {
            return;
        }
        for (_, filter) in self.snapshot() {
            lock_stage(&filter).on_stop();
        }
    }

    fn cancel_stages(&self) {
        for lifecycle in self.lifecycles() {
            lifecycle.cancel();
        }
    }
}

/// Linear chain of stages with shared lifecycle control
pub struct Pipeline {
    core: Arc<PipelineCore>,
    thread: ControlledThread,
    /// Stream for the input of the first stage pushed
    pending_input: Option<AnyStream>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    fn ensure_stopped(&self, operation: &str) -> Result<()> {
        if self.core.state().is_stopped() {
            Ok(())
        } else {
            Err(StreamError::InvalidState(format!(
                "{} requires pipeline '{}' to be stopped",
                operation, self.core.name
            )))
        }
    }

    // ── Chain building ──

    /// Append a stage, wiring it to the current last stage.
    ///
    /// Fails without modifying anything when the pipeline runs, the stage is
    /// started or already present, or the endpoints cannot be connected.
    pub fn push_back(&mut self, stage: SharedFilter) -> Result<()> {
        self.ensure_stopped("push_back")?;
        let mut stages = self.core.stages.write().unwrap_or_else(|e| e.into_inner());
        if stages.iter().any(|entry| same_stage(&entry.filter, &stage)) {
            return Err(StreamError::ConfigurationInvalid(
                "stage is already part of the pipeline".to_string(),
            ));
        }

        let mut next = lock_stage(&stage);
        if !next.lifecycle().is_stopped() {
            return Err(StreamError::InvalidState(format!(
                "stage '{}' must be stopped before it is appended",
                next.name()
            )));
        }

        match stages.last() {
            Some(last) => {
                let mut prev = lock_stage(&last.filter);
                wire(&mut *prev, &mut *next)?;
            }
            None => {
                if let Some(stream) = &self.pending_input {
                    let input = next.input_mut().ok_or_else(|| {
                        StreamError::ConfigurationInvalid(
                            "first stage has no input for the pushed stream".to_string(),
                        )
                    })?;
                    input.connect(stream)?;
                }
                self.pending_input = None;
            }
        }

        let entry = StageEntry {
            name: next.name().to_string(),
            lifecycle: next.lifecycle().clone(),
            filter: Arc::clone(&stage),
        };
        drop(next);

        self.core
            .logger
            .debug(&self.core.name, &format!("appended stage '{}'", entry.name));
        stages.push(entry);
        drop(stages);
        self.core.invalidate();
        Ok(())
    }

    /// Feed a stream into the chain.
    ///
    /// On an empty pipeline it becomes the input of the first stage pushed;
    /// otherwise it becomes the output of the last stage.
    pub fn push_stream(&mut self, stream: AnyStream) -> Result<()> {
        self.ensure_stopped("push_stream")?;
        let stages = self.core.stages.read().unwrap_or_else(|e| e.into_inner());
        match stages.last() {
            None => self.pending_input = Some(stream),
            Some(last) => {
                let mut stage = lock_stage(&last.filter);
                let name = stage.name().to_string();
                stage
                    .output_mut()
                    .ok_or_else(|| {
                        StreamError::ConfigurationInvalid(format!("stage '{}' has no output", name))
                    })?
                    .connect(&stream)?;
            }
        }
        drop(stages);
        self.core.invalidate();
        Ok(())
    }

    /// Move every stage of `other` to the end of this pipeline
    pub fn push_pipeline(&mut self, other: &mut Pipeline) -> Result<()> {
        self.ensure_stopped("push_pipeline")?;
        other.ensure_stopped("push_pipeline")?;

        let mut stages = self.core.stages.write().unwrap_or_else(|e| e.into_inner());
        let mut incoming = other.core.stages.write().unwrap_or_else(|e| e.into_inner());
        if incoming.is_empty() {
            return Ok(());
        }
        if incoming
            .iter()
            .any(|entry| stages.iter().any(|own| same_stage(&own.filter, &entry.filter)))
        {
            return Err(StreamError::ConfigurationInvalid(
                "pipelines share a stage".to_string(),
            ));
        }

        match stages.last() {
            Some(last) => {
                let mut prev = lock_stage(&last.filter);
                let mut next = lock_stage(&incoming[0].filter);
                wire(&mut *prev, &mut *next)?;
            }
            None => {
                if self.pending_input.is_none() {
                    self.pending_input = other.pending_input.take();
                }
            }
        }

        self.core.logger.debug(
            &self.core.name,
            &format!("spliced {} stages from '{}'", incoming.len(), other.core.name),
        );
        stages.append(&mut *incoming);
        drop(incoming);
        drop(stages);
        self.core.invalidate();
        other.core.invalidate();
        Ok(())
    }

    /// Stop and remove every stage
    pub fn clear(&mut self) {
        self.stop();
        self.core
            .stages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.pending_input = None;
        self.core.invalidate();
    }

    // ── Lifecycle ──

    /// Validate every stage's endpoints.
    ///
    /// Returns `Ok(false)` while the chain is incomplete and an error when a
    /// chain that was valid has since lost a connection.
    pub fn is_configured(&self) -> Result<bool> {
        let mut cache = self.core.configured.lock().unwrap_or_else(|e| e.into_inner());
        if !self.core.state().is_stopped() {
            if let Some(valid) = cache.cached {
                return Ok(valid);
            }
        }

        let stages = self.core.snapshot();
        let valid = !stages.is_empty()
            && stages
                .iter()
                .all(|(_, filter)| lock_stage(filter).is_configured());
        cache.cached = Some(valid);

        if valid {
            cache.was_valid = true;
            Ok(true)
        } else if cache.was_valid {
            cache.was_valid = false;
            Err(StreamError::ConfigurationInvalid(format!(
                "pipeline '{}' lost a connection since it was last validated",
                self.core.name
            )))
        } else {
            Ok(false)
        }
    }

    pub fn start(&self) -> Result<()> {
        let mode = self.core.mode();
        if !mode.is_frame_driven() {
            return Err(StreamError::Unsupported(format!(
                "{} playback is not driven by the pipeline",
                mode
            )));
        }
        let state = self.core.state();
        if state.is_started() {
            return Ok(());
        }
        if !self.is_configured()? {
            self.core.logger.error(
                &self.core.name,
                "not starting: a stage has an unconnected endpoint",
            );
            return Err(StreamError::ConfigurationInvalid(format!(
                "pipeline '{}' is not configured",
                self.core.name
            )));
        }

        if state.is_stopped() {
            // A frame thread that halted the pipeline may still be unwinding its tick.
            self.thread.wait_for_suspend();
            for (name, filter) in self.core.snapshot() {
                lock_stage(&filter)
                    .on_start()
                    .with_context(|| format!("starting stage '{}'", name))?;
            }
            self.core.hooks_pending.store(true, Ordering::SeqCst);
            self.core.end_of_stream.store(false, Ordering::SeqCst);
        }

        for lifecycle in self.core.lifecycles() {
            lifecycle.start()?;
        }
        if let Some(clock) = self.core.clock() {
            clock.lock().unwrap_or_else(|e| e.into_inner()).play();
        }
        self.core.set_state(ControlState::Started);

        if mode == PlaybackMode::FrameBased {
            if !self.thread.is_attached() {
                self.attach_frame_loop();
            }
            self.thread.start()?;
        }
        self.core
            .logger
            .info(&self.core.name, &format!("started ({})", mode));
        Ok(())
    }

    fn attach_frame_loop(&self) {
        let core = Arc::clone(&self.core);
        let cancel_core = Arc::clone(&self.core);
        // A tick that ends the run has already commanded this thread.
        self.thread.attach_with_cancel(
            move || {
                let _ = core.tick();
            },
            move || cancel_core.cancel_stages(),
        );
    }

    /// Run one tick on the calling thread (single-step mode)
    pub fn step(&self) -> Result<StepOutcome> {
        if self.core.mode() == PlaybackMode::FrameBased {
            return Err(StreamError::InvalidState(format!(
                "pipeline '{}' is driven by its frame thread",
                self.core.name
            )));
        }
        if !self.core.state().is_started() {
            return Err(StreamError::InvalidState(format!(
                "pipeline '{}' is not started",
                self.core.name
            )));
        }
        self.core.tick()
    }

    /// Let the current tick finish, then hold. Does not block.
    pub fn pause(&self) {
        if !self.core.state().is_started() {
            return;
        }
        self.core.pause_stages();
        self.core.logger.info(&self.core.name, "paused");
    }

    /// Stop every stage and the frame thread.
    ///
    /// On return no `process()` call is in flight and the `on_stop` hooks ran.
    pub fn stop(&self) {
        let was = self.core.state();
        self.core.set_state(ControlState::Stopped);
        // The thread is commanded first so an aborted tick does not start another.
        self.thread.stop();
        for lifecycle in self.core.lifecycles() {
            lifecycle.stop();
        }
        self.thread.wait_for_suspend();
        for lifecycle in self.core.lifecycles() {
            lifecycle.wait_for_suspend();
        }
        self.core.run_stop_hooks();
        if !was.is_stopped() {
            self.core.logger.info(&self.core.name, "stopped");
        }
    }

    /// Block until the pipeline is `Stopped` and its thread parked
    pub fn wait_until_stopped(&self) {
        let mut state = self.core.state.lock().unwrap_or_else(|e| e.into_inner());
        while !state.is_stopped() {
            state = self
                .core
                .state_changed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(state);
        self.thread.wait_for_suspend();
    }

    /// Block until the pipeline leaves `Started`
    pub fn wait_until_idle(&self) {
        let mut state = self.core.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.is_started() {
            state = self
                .core
                .state_changed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(state);
        self.thread.wait_for_suspend();
    }

    // ── Accessors ──

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> ControlState {
        self.core.state()
    }

    /// A stage ended the stream or the clock ran out
    pub fn is_finished(&self) -> bool {
        self.core.end_of_stream.load(Ordering::SeqCst)
            || self
                .core
                .clock()
                .map(|clock| clock.lock().unwrap_or_else(|e| e.into_inner()).finished())
                .unwrap_or(false)
    }

    pub fn mode(&self) -> PlaybackMode {
        self.core.mode()
    }

    /// Change how the pipeline advances; only while stopped
    pub fn set_mode(&self, mode: PlaybackMode) -> Result<()> {
        self.ensure_stopped("set_mode")?;
        *self.core.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
        if let Some(clock) = self.core.clock() {
            clock.lock().unwrap_or_else(|e| e.into_inner()).set_mode(mode);
        }
        Ok(())
    }

    pub fn clock(&self) -> Option<SharedClock> {
        self.core.clock()
    }

    pub fn set_clock(&self, clock: Option<SharedClock>) {
        *self.core.clock.lock().unwrap_or_else(|e| e.into_inner()) = clock;
    }

    /// Completed ticks since creation
    pub fn ticks(&self) -> u64 {
        self.core.ticks.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.core
            .stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stages in order
    pub fn iter(&self) -> std::vec::IntoIter<StageInfo> {
        self.core
            .snapshot()
            .into_iter()
            .map(|(name, filter)| {
                let stage = lock_stage(&filter);
                StageInfo {
                    name,
                    input: stage.input().map(|slot| slot.stream_type().name()),
                    output: stage.output().map(|slot| slot.stream_type().name()),
                    connected: stage.is_connected(),
                    state: stage.lifecycle().state(),
                }
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Input stream of the first stage
    pub fn input(&self) -> Result<AnyStream> {
        let stages = self.core.snapshot();
        let (name, first) = stages.first().ok_or(StreamError::EmptyPipeline)?;
        let stage = lock_stage(first);
        stage
            .input()
            .and_then(|slot| slot.handle())
            .ok_or_else(|| StreamError::NotConnected(format!("input of '{}'", name)))
    }

    /// Output stream of the last stage
    pub fn output(&self) -> Result<AnyStream> {
        let stages = self.core.snapshot();
        let (name, last) = stages.last().ok_or(StreamError::EmptyPipeline)?;
        let stage = lock_stage(last);
        stage
            .output()
            .and_then(|slot| slot.handle())
            .ok_or_else(|| StreamError::NotConnected(format!("output of '{}'", name)))
    }

    /// Typed view of [`output`](Self::output)
    pub fn output_stream<T: Send + Sync + 'static>(&self) -> Result<Stream<T>> {
        self.output()?.downcast::<T>()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.core.state().is_stopped() || self.core.hooks_pending.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline '{}' [{}, {}]:",
            self.core.name,
            self.core.state(),
            self.core.mode()
        )?;
        let stages = self.core.stages.read().unwrap_or_else(|e| e.into_inner());
        if stages.is_empty() {
            return write!(f, " (empty)");
        }
        for (index, entry) in stages.iter().enumerate() {
            let separator = if index == 0 { " " } else { " -> " };
            write!(f, "{}{}", separator, entry.name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.core.name)
            .field("state", &self.core.state())
            .field("mode", &self.core.mode())
            .field("stages", &self.len())
            .finish()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    mode: PlaybackMode,
    clock: Option<SharedClock>,
    logger: Option<Logger>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: PlaybackMode::default(),
            clock: None,
            logger: None,
        }
    }

    pub fn mode(mut self, mode: PlaybackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Pipeline {
        let logger = self.logger.unwrap_or_else(default_logger);
        let thread =
            ControlledThread::with_logger(format!("{}-frames", self.name), logger.clone());
        Pipeline {
            core: Arc::new(PipelineCore {
                name: self.name,
                stages: RwLock::new(Vec::new()),
                state: Mutex::new(ControlState::Stopped),
                state_changed: Condvar::new(),
                mode: Mutex::new(self.mode),
                clock: Mutex::new(self.clock),
                configured: Mutex::new(ConfigCache::default()),
                hooks_pending: AtomicBool::new(false),
                end_of_stream: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
                frames: thread.handle(),
                logger,
            }),
            thread,
            pending_input: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{shared, GeneratorFilter, MapFilter, SinkFilter};
    use crate::logging::{null_logger, LogLevel, MemorySink};
    use crate::playback::PlaybackClock;

    fn single_step(name: &str) -> Pipeline {
        Pipeline::builder(name)
            .mode(PlaybackMode::SingleStepTrigger)
            .logger(null_logger())
            .build()
    }

    fn counter(limit: u32) -> SharedFilter {
        let mut n = 0;
        shared(GeneratorFilter::new("count", move || {
            n += 1;
            Ok((n <= limit).then_some(n))
        }))
    }

    #[test]
    fn test_empty_pipeline_accessors_fail() {
        let pipeline = single_step("empty");
        assert!(pipeline.is_empty());
        assert!(matches!(pipeline.input(), Err(StreamError::EmptyPipeline)));
        assert!(matches!(pipeline.output(), Err(StreamError::EmptyPipeline)));
        assert!(!pipeline.is_configured().unwrap());
        assert!(matches!(
            pipeline.start(),
            Err(StreamError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_single_step_chain() {
        let mut pipeline = single_step("chain");
        pipeline.push_back(counter(3)).unwrap();
        pipeline
            .push_back(shared(MapFilter::new("square", |i: &u32, o: &mut u32| {
                *o = i * i;
                Ok(())
            })))
            .unwrap();

        assert!(pipeline.is_configured().unwrap());
        assert!(matches!(pipeline.step(), Err(StreamError::InvalidState(_))));
        pipeline.start().unwrap();

        let output = pipeline.output_stream::<u32>().unwrap();
        assert_eq!(pipeline.step().unwrap(), StepOutcome::Completed);
        assert_eq!(output.get(), 1);
        pipeline.step().unwrap();
        pipeline.step().unwrap();
        assert_eq!(output.get(), 9);

        assert_eq!(pipeline.step().unwrap(), StepOutcome::EndOfStream);
        assert_eq!(pipeline.state(), ControlState::Stopped);
        assert!(pipeline.is_finished());
        assert_eq!(pipeline.ticks(), 3);
    }

    #[test]
    fn test_type_mismatch_leaves_chain_unchanged() {
        let mut pipeline = single_step("mismatch");
        pipeline.push_back(counter(1)).unwrap();
        let err = pipeline
            .push_back(shared(SinkFilter::new("text", |_: &String| Ok(()))))
            .unwrap_err();
        assert!(matches!(err, StreamError::IncompatibleStreamType { .. }));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut pipeline = single_step("dup");
        let stage = counter(1);
        pipeline.push_back(stage.clone()).unwrap();
        assert!(pipeline.push_back(stage).is_err());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn test_push_stream_feeds_first_stage() {
        let mut pipeline = single_step("fed");
        let source = Stream::new("numbers", 4_u32);
        pipeline.push_stream(source.clone().into_any()).unwrap();
        pipeline
            .push_back(shared(MapFilter::new("inc", |i: &u32, o: &mut u32| {
                *o = i + 1;
                Ok(())
            })))
            .unwrap();

        assert!(pipeline.input().unwrap().same_as(&source.clone().into_any()));
        pipeline.start().unwrap();
        pipeline.step().unwrap();
        assert_eq!(pipeline.output_stream::<u32>().unwrap().get(), 5);
    }

    #[test]
    fn test_broken_configuration_is_an_error() {
        let mut pipeline = single_step("broken");
        let sink = shared(SinkFilter::new("sink", |_: &u32| Ok(())));
        pipeline.push_back(counter(1)).unwrap();
        pipeline.push_back(sink.clone()).unwrap();
        assert!(pipeline.is_configured().unwrap());

        sink.lock().unwrap().input_mut().unwrap().disconnect();
        assert!(pipeline.is_configured().is_err());
        assert!(!pipeline.is_configured().unwrap());
    }

    #[test]
    fn test_time_modes_unsupported() {
        let mut pipeline = single_step("timed");
        pipeline.push_back(counter(1)).unwrap();
        pipeline.set_mode(PlaybackMode::TimeBased).unwrap();
        assert!(matches!(pipeline.start(), Err(StreamError::Unsupported(_))));
    }

    #[test]
    fn test_clock_finish_pauses() {
        let mut clock = PlaybackClock::new(PlaybackMode::SingleStepTrigger);
        clock.set_absolute_times(1.0, 0.0, 3.0).unwrap();
        let clock = clock.into_shared();

        let mut pipeline = single_step("clocked");
        pipeline.set_clock(Some(clock.clone()));
        pipeline.push_back(counter(100)).unwrap();
        pipeline.start().unwrap();

        assert_eq!(pipeline.step().unwrap(), StepOutcome::Completed);
        assert_eq!(pipeline.step().unwrap(), StepOutcome::Completed);
        assert_eq!(pipeline.step().unwrap(), StepOutcome::Finished);
        assert_eq!(pipeline.state(), ControlState::Paused);
        assert!(pipeline.is_finished());
        assert_eq!(clock.lock().unwrap().current_frame(), 2);
    }

    #[test]
    fn test_stage_error_stops_and_logs() {
        let sink = Arc::new(MemorySink::new());
        let mut pipeline = Pipeline::builder("failing")
            .mode(PlaybackMode::SingleStepTrigger)
            .logger(sink.clone())
            .build();
        pipeline.push_back(counter(5)).unwrap();
        pipeline
            .push_back(shared(SinkFilter::new("reject", |_: &u32| {
                Err(StreamError::stage("reject", "bad sample"))
            })))
            .unwrap();
        pipeline.start().unwrap();

        let err = pipeline.step().unwrap_err();
        assert!(matches!(err.root(), StreamError::Stage { .. }));
        assert_eq!(pipeline.state(), ControlState::Stopped);
        assert!(sink.contains(LogLevel::Error, "reject"));
    }

    #[test]
    fn test_display_lists_stages() {
        let mut pipeline = single_step("shown");
        assert_eq!(
            pipeline.to_string(),
            "Pipeline 'shown' [Stopped, single-step]: (empty)"
        );
        pipeline.push_back(counter(1)).unwrap();
        pipeline
            .push_back(shared(SinkFilter::new("drop", |_: &u32| Ok(()))))
            .unwrap();
        assert_eq!(
            pipeline.to_string(),
            "Pipeline 'shown' [Stopped, single-step]: count -> drop"
        );
        let names: Vec<String> = pipeline.iter().map(|info| info.name).collect();
        assert_eq!(names, vec!["count", "drop"]);
    }
}
