//! MapFilter: transforms its input stream into its output stream in place.

use crate::control::Lifecycle;
use crate::error::Result;
use crate::filter::{Filter, FilterBase};
use crate::stream::{DataSlot, Payload, Slot};

type MapFn<I, O> = Box<dyn FnMut(&I, &mut O) -> Result<()> + Send>;
type InitFn<I, O> = Box<dyn FnMut(&I) -> Result<O> + Send>;

/// Closure-backed transform stage.
///
/// The output value is reused between ticks. An optional init closure builds
/// it from the first input seen, for outputs whose shape depends on the data.
pub struct MapFilter<I: Payload, O: Payload> {
    base: FilterBase,
    input: Slot<I>,
    output: Slot<O>,
    map: MapFn<I, O>,
    init: Option<InitFn<I, O>>,
    processed: u64,
}

impl<I: Payload, O: Payload> MapFilter<I, O> {
    pub fn new<F>(name: impl Into<String>, map: F) -> Self
    where
        F: FnMut(&I, &mut O) -> Result<()> + Send + 'static,
    {
        let base = FilterBase::new(name);
        let input = Slot::new(format!("{}.in", base.name()));
        let output = Slot::with_value(format!("{}.out", base.name()), O::default());
        Self {
            base,
            input,
            output,
            map: Box::new(map),
            init: None,
            processed: 0,
        }
    }

    /// Build the output from the first input before the first map call
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: FnMut(&I) -> Result<O> + Send + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    pub fn input_slot(&self) -> &Slot<I> {
        &self.input
    }

    pub fn output_slot(&self) -> &Slot<O> {
        &self.output
    }

    pub fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    /// Number of successful `process()` calls
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl<I: Payload, O: Payload> Filter for MapFilter<I, O> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn input(&self) -> Option<&dyn DataSlot> {
        Some(&self.input)
    }

    fn input_mut(&mut self) -> Option<&mut dyn DataSlot> {
        Some(&mut self.input)
    }

    fn output(&self) -> Option<&dyn DataSlot> {
        Some(&self.output)
    }

    fn output_mut(&mut self) -> Option<&mut dyn DataSlot> {
        Some(&mut self.output)
    }

    fn process(&mut self) -> Result<()> {
        let input = self.input.stream()?.clone();
        let output = self.output.stream()?.clone();
        let value = input.read();

        if !self.base.is_initialized() {
            if let Some(init) = self.init.as_mut() {
                output.set(init(&value)?);
            }
            self.base.mark_initialized();
        }

        (self.map)(&value, &mut output.write())?;
        output.share_context(input.context());
        self.processed += 1;
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.base.lifecycle()
    }
}
