//! Stage endpoints.
//!
//! A [`Slot<T>`] is where a stage keeps its input or output stream. Slots are
//! seen by the pipeline through the type-erased [`DataSlot`] trait so it can
//! check types and wire neighbours without knowing the payloads.

use super::data::{AnyStream, Stream, StreamType};
use crate::error::{Result, StreamError};
use std::fmt;

/// Type-erased view of a stage endpoint
pub trait DataSlot: Send {
    fn name(&self) -> &str;

    /// Payload type this slot accepts
    fn stream_type(&self) -> StreamType;

    fn is_connected(&self) -> bool;

    /// Handle to the connected stream, if any
    fn handle(&self) -> Option<AnyStream>;

    /// Alias `stream`, replacing any previous connection
    fn connect(&mut self, stream: &AnyStream) -> Result<()>;

    fn disconnect(&mut self);
}

/// Typed endpoint holding an optional stream handle
pub struct Slot<T> {
    name: String,
    stream: Option<Stream<T>>,
}

impl<T: Send + Sync + 'static> Slot<T> {
    /// Unconnected slot
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream: None,
        }
    }

    /// Slot owning a fresh stream initialised with `value`
    pub fn with_value(name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        let stream = Stream::new(name.clone(), value);
        Self {
            name,
            stream: Some(stream),
        }
    }

    pub fn connect_stream(&mut self, stream: Stream<T>) {
        self.stream = Some(stream);
    }

    pub fn stream(&self) -> Result<&Stream<T>> {
        self.stream
            .as_ref()
            .ok_or_else(|| StreamError::NotConnected(self.name.clone()))
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.stream()?.set(value);
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> Slot<T> {
    pub fn get(&self) -> Result<T> {
        Ok(self.stream()?.get())
    }
}

impl<T: Send + Sync + 'static> DataSlot for Slot<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream_type(&self) -> StreamType {
        StreamType::of::<T>()
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn handle(&self) -> Option<AnyStream> {
        self.stream.clone().map(Stream::into_any)
    }

    fn connect(&mut self, stream: &AnyStream) -> Result<()> {
        let typed = stream.downcast::<T>()?;
        self.stream = Some(typed);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("type", &StreamType::of::<T>().name())
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_access_fails() {
        let slot = Slot::<u32>::new("in");
        assert!(!slot.is_connected());
        assert!(matches!(slot.get(), Err(StreamError::NotConnected(name)) if name == "in"));
    }

    #[test]
    fn test_connect_aliases() {
        let producer = Slot::with_value("out", 1_u32);
        let mut consumer = Slot::<u32>::new("in");
        consumer.connect(&producer.handle().unwrap()).unwrap();

        producer.set(42).unwrap();
        assert_eq!(consumer.get().unwrap(), 42);
        assert!(consumer.stream().unwrap().same_as(producer.stream().unwrap()));
    }

    #[test]
    fn test_connect_rejects_other_type() {
        let producer = Slot::with_value("out", String::from("x"));
        let mut consumer = Slot::<u32>::new("in");
        let err = consumer.connect(&producer.handle().unwrap()).unwrap_err();
        assert!(matches!(err, StreamError::IncompatibleStreamType { .. }));
        assert!(!consumer.is_connected());
    }
}
