//! GeneratorFilter: head-of-chain stage producing values from a closure.

use crate::control::Lifecycle;
use crate::error::{Result, StreamError};
use crate::filter::{Filter, FilterBase};
use crate::stream::{DataSlot, Payload, Slot, StreamContext};

type GenerateFn<T> = Box<dyn FnMut() -> Result<Option<T>> + Send>;

/// Stage without input; `None` from the closure ends the stream
pub struct GeneratorFilter<T: Payload> {
    base: FilterBase,
    output: Slot<T>,
    generate: GenerateFn<T>,
    produced: u64,
    label: Option<String>,
}

impl<T: Payload> GeneratorFilter<T> {
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: FnMut() -> Result<Option<T>> + Send + 'static,
    {
        let base = FilterBase::new(name);
        let output = Slot::with_value(format!("{}.out", base.name()), T::default());
        Self {
            base,
            output,
            generate: Box::new(generate),
            produced: 0,
            label: None,
        }
    }

    /// Tag every produced value with a context carrying `label` and the
    /// sequence number as frame
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn output_slot(&self) -> &Slot<T> {
        &self.output
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl<T: Payload> Filter for GeneratorFilter<T> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn output(&self) -> Option<&dyn DataSlot> {
        Some(&self.output)
    }

    fn output_mut(&mut self) -> Option<&mut dyn DataSlot> {
        Some(&mut self.output)
    }

    fn process(&mut self) -> Result<()> {
        let value = (self.generate)()?.ok_or(StreamError::EndOfStream)?;
        let stream = self.output.stream()?;
        stream.set(value);
        if let Some(label) = &self.label {
            stream.set_context(Some(
                StreamContext::new(label.clone()).with_frame(self.produced as i64),
            ));
        }
        self.produced += 1;
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.base.lifecycle()
    }
}
