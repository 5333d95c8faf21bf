//! Pipeline stages.
//!
//! A stage implements [`Filter`]: it exposes an optional input and output
//! [`DataSlot`], does one unit of work per [`Filter::process`] call and carries
//! a [`Lifecycle`] the pipeline commands. Shared state that every stage needs
//! (name, lifecycle, first-input flag) lives in [`FilterBase`].
//!
//! # Stage kinds
//!
//! - [`BufferReader`] - pops from a buffer into its output slot
//! - [`BufferWriter`] - pushes its input slot into a buffer
//! - [`nodes`] - closure-backed map, generator and sink stages

pub mod nodes;
pub mod reader;
pub mod writer;

pub use nodes::{GeneratorFilter, MapFilter, SinkFilter};
pub use reader::{BufferReader, EmptyPolicy, Source};
pub use writer::{BufferWriter, Sink};

use crate::control::Lifecycle;
use crate::error::Result;
use crate::stream::DataSlot;
use std::sync::{Arc, Mutex};

/// One unit of pipeline computation
pub trait Filter: Send {
    fn name(&self) -> &str;

    /// Input endpoint; `None` when the stage reads from a buffer or nothing
    fn input(&self) -> Option<&dyn DataSlot> {
        None
    }

    fn input_mut(&mut self) -> Option<&mut dyn DataSlot> {
        None
    }

    /// Output endpoint; `None` when the stage writes to a buffer or nothing
    fn output(&self) -> Option<&dyn DataSlot> {
        None
    }

    fn output_mut(&mut self) -> Option<&mut dyn DataSlot> {
        None
    }

    /// Run one step.
    ///
    /// `Err(StreamInterrupted)` or `Err(Interrupted)` abort the current tick,
    /// `Err(EndOfStream)` stops the pipeline.
    fn process(&mut self) -> Result<()>;

    fn lifecycle(&self) -> &Lifecycle;

    /// Every present endpoint is connected
    fn is_connected(&self) -> bool {
        self.input().map_or(true, |slot| slot.is_connected())
            && self.output().map_or(true, |slot| slot.is_connected())
    }

    fn is_configured(&self) -> bool {
        self.is_connected()
    }

    /// Called by the pipeline when it starts from `Stopped`
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called by the pipeline once no `process()` call is in flight
    fn on_stop(&mut self) {}
}

/// Stage handle shared between its owner and a pipeline
pub type SharedFilter = Arc<Mutex<dyn Filter>>;

/// Wrap a stage for use in a pipeline
pub fn shared<F: Filter + 'static>(filter: F) -> Arc<Mutex<F>> {
    Arc::new(Mutex::new(filter))
}

/// State common to every stage
#[derive(Debug)]
pub struct FilterBase {
    name: String,
    lifecycle: Lifecycle,
    initialized: bool,
}

impl FilterBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: Lifecycle::new(),
            initialized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Whether the first input has been seen
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// Forget the first input so the next one re-initialises the stage
    pub fn reset_initialized(&mut self) {
        self.initialized = false;
    }
}
