//! SinkFilter: terminal stage handing each input to a closure.

use crate::control::Lifecycle;
use crate::error::Result;
use crate::filter::{Filter, FilterBase};
use crate::stream::{DataSlot, Payload, Slot};

type ConsumeFn<T> = Box<dyn FnMut(&T) -> Result<()> + Send>;

pub struct SinkFilter<T: Payload> {
    base: FilterBase,
    input: Slot<T>,
    consume: ConsumeFn<T>,
    consumed: u64,
}

impl<T: Payload> SinkFilter<T> {
    pub fn new<F>(name: impl Into<String>, consume: F) -> Self
    where
        F: FnMut(&T) -> Result<()> + Send + 'static,
    {
        let base = FilterBase::new(name);
        let input = Slot::new(format!("{}.in", base.name()));
        Self {
            base,
            input,
            consume: Box::new(consume),
            consumed: 0,
        }
    }

    pub fn input_slot(&self) -> &Slot<T> {
        &self.input
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<T: Payload> Filter for SinkFilter<T> {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn input(&self) -> Option<&dyn DataSlot> {
        Some(&self.input)
    }

    fn input_mut(&mut self) -> Option<&mut dyn DataSlot> {
        Some(&mut self.input)
    }

    fn process(&mut self) -> Result<()> {
        let stream = self.input.stream()?;
        (self.consume)(&stream.read())?;
        self.consumed += 1;
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.base.lifecycle()
    }
}
