//! Typed stream values shared between connected stages.
//!
//! A [`Stream<T>`] is a named cell. Cloning it yields another handle to the
//! same cell, which is how a producer's output and a consumer's input end up
//! aliasing one payload instead of copying it.

use crate::error::{Result, StreamError};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Bounds for values carried through buffers and slots
pub trait Payload: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> Payload for T {}

/// Runtime tag of a stream's payload type
#[derive(Debug, Clone, Copy)]
pub struct StreamType {
    id: TypeId,
    name: &'static str,
}

impl StreamType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `Ok` when both tags name the same type
    pub fn ensure_matches(&self, found: &StreamType) -> Result<()> {
        if self == found {
            Ok(())
        } else {
            Err(StreamError::IncompatibleStreamType {
                expected: self.name,
                found: found.name,
            })
        }
    }
}

impl PartialEq for StreamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StreamType {}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Metadata travelling with a stream value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamContext {
    pub label: String,
    pub frame: Option<i64>,
    pub time: Option<f64>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl StreamContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_frame(mut self, frame: i64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

struct StreamCell<T> {
    name: String,
    value: RwLock<T>,
    context: RwLock<Option<Arc<StreamContext>>>,
}

/// Handle to a named, shared payload
pub struct Stream<T> {
    cell: Arc<StreamCell<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + Sync + 'static> Stream<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            cell: Arc::new(StreamCell {
                name: name.into(),
                value: RwLock::new(value),
                context: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn stream_type(&self) -> StreamType {
        StreamType::of::<T>()
    }

    /// Shared read access to the value
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.value.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Exclusive write access to the value
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.value.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, value: T) {
        *self.write() = value;
    }

    pub fn context(&self) -> Option<Arc<StreamContext>> {
        self.cell
            .context
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_context(&self, context: Option<StreamContext>) {
        *self.cell.context.write().unwrap_or_else(|e| e.into_inner()) = context.map(Arc::new);
    }

    /// Share an existing context without copying it
    pub fn share_context(&self, context: Option<Arc<StreamContext>>) {
        *self.cell.context.write().unwrap_or_else(|e| e.into_inner()) = context;
    }

    /// Whether both handles alias the same payload
    pub fn same_as(&self, other: &Stream<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Number of handles aliasing this payload
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    pub fn into_any(self) -> AnyStream {
        AnyStream {
            ty: StreamType::of::<T>(),
            name: self.cell.name.clone(),
            inner: self.cell,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    pub fn get(&self) -> T {
        self.read().clone()
    }
}

impl<T: fmt::Debug + Send + Sync + 'static> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.cell.name)
            .field("value", &*self.read())
            .field("context", &self.context())
            .finish()
    }
}

impl<T: Send + Sync + 'static> fmt::Display for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.cell.name, StreamType::of::<T>())
    }
}

/// Type-erased stream handle carrying an explicit type tag
#[derive(Clone)]
pub struct AnyStream {
    ty: StreamType,
    name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl AnyStream {
    pub fn stream_type(&self) -> StreamType {
        self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recover the typed handle; the tag is checked before any cast
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Result<Stream<T>> {
        StreamType::of::<T>().ensure_matches(&self.ty)?;
        let cell = Arc::clone(&self.inner)
            .downcast::<StreamCell<T>>()
            .map_err(|_| StreamError::IncompatibleStreamType {
                expected: std::any::type_name::<T>(),
                found: self.ty.name(),
            })?;
        Ok(Stream { cell })
    }

    pub fn same_as(&self, other: &AnyStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + Sync + 'static> From<Stream<T>> for AnyStream {
    fn from(stream: Stream<T>) -> Self {
        stream.into_any()
    }
}

impl fmt::Debug for AnyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyStream")
            .field("name", &self.name)
            .field("type", &self.ty.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_alias_payload() {
        let a = Stream::new("samples", vec![1.0_f64, 2.0]);
        let b = a.clone();
        b.write().push(3.0);
        assert_eq!(a.get(), vec![1.0, 2.0, 3.0]);
        assert!(a.same_as(&b));
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn test_downcast_checks_tag() {
        let any = Stream::new("count", 5_u32).into_any();
        assert_eq!(any.downcast::<u32>().unwrap().get(), 5);

        let err = any.downcast::<i64>().unwrap_err();
        match err {
            StreamError::IncompatibleStreamType { expected, found } => {
                assert_eq!(expected, "i64");
                assert_eq!(found, "u32");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_context_is_shared() {
        let stream = Stream::new("frame", 0_u8);
        let alias = stream.clone();
        stream.set_context(Some(
            StreamContext::new("sim")
                .with_frame(3)
                .with_time(0.3)
                .with_attribute("unit", "mV"),
        ));
        let context = alias.context().unwrap();
        assert_eq!(context.frame, Some(3));
        assert_eq!(context.attributes["unit"], "mV");
    }

    #[test]
    fn test_display_names_type() {
        let stream = Stream::new("volts", 0.0_f32);
        assert_eq!(stream.to_string(), "volts<f32>");
    }
}
