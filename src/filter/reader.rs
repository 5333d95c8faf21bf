//! Stage whose input endpoint is a buffer.
//!
//! Each `process()` blocks for the head of the buffer, copies it into the
//! output slot and releases it. An optional [`Source`] fills the buffer from
//! the reader's own [`ControlledThread`], so production runs concurrently with
//! the pipeline's ticks.

use super::{Filter, FilterBase};
use crate::buffer::{Interruption, RingBuffer};
use crate::control::{ControlledThread, Lifecycle};
use crate::error::{Result, StreamError};
use crate::logging::{default_logger, Logger};
use crate::stream::{DataSlot, Payload, Slot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What `process()` does when the buffer is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPolicy {
    /// Block until data arrives
    #[default]
    Wait,
    /// Report the end of the stream
    EndOfStream,
}

/// Producer feeding a reader's buffer
pub trait Source<T>: Send {
    /// Next value, or `None` once exhausted
    fn produce(&mut self) -> Result<Option<T>>;
}

impl<T, F> Source<T> for F
where
    F: FnMut() -> Result<Option<T>> + Send,
{
    fn produce(&mut self) -> Result<Option<T>> {
        self()
    }
}

pub struct BufferReader<T: Payload> {
    base: FilterBase,
    buffer: Arc<RingBuffer<T>>,
    output: Slot<T>,
    read_token: Interruption,
    policy: EmptyPolicy,
    exhausted: Arc<AtomicBool>,
    producer: Option<ControlledThread>,
    logger: Logger,
}

impl<T: Payload> BufferReader<T> {
    /// Reader over a buffer filled by someone else
    pub fn new(name: impl Into<String>, buffer: Arc<RingBuffer<T>>) -> Self {
        Self::with_logger(name, buffer, default_logger())
    }

    pub fn with_logger(name: impl Into<String>, buffer: Arc<RingBuffer<T>>, logger: Logger) -> Self {
        let base = FilterBase::new(name);
        let read_token = buffer.create_read_interruption();
        base.lifecycle().watch(read_token.clone());
        let output = Slot::with_value(format!("{}.out", base.name()), T::default());
        Self {
            base,
            buffer,
            output,
            read_token,
            policy: EmptyPolicy::Wait,
            exhausted: Arc::new(AtomicBool::new(false)),
            producer: None,
            logger,
        }
    }

    /// Reader whose buffer is filled by `source` on a dedicated thread
    pub fn with_source<S>(
        name: impl Into<String>,
        buffer: Arc<RingBuffer<T>>,
        source: S,
        logger: Logger,
    ) -> Self
    where
        S: Source<T> + 'static,
    {
        let mut reader = Self::with_logger(name, buffer, logger);
        reader.attach_source(source);
        reader
    }

    fn attach_source<S>(&mut self, mut source: S)
    where
        S: Source<T> + 'static,
    {
        let name = format!("{}-source", self.base.name());
        let thread = ControlledThread::with_logger(name.clone(), self.logger.clone());
        let handle = thread.handle();

        let write_token = self.buffer.create_write_interruption();
        self.base.lifecycle().watch(write_token.clone());
        self.base.lifecycle().drive(thread.handle());

        let buffer = Arc::clone(&self.buffer);
        let exhausted = Arc::clone(&self.exhausted);
        // Wakes a process() blocked on the empty buffer once nothing more comes.
        let read_token = self.read_token.clone();
        let logger = self.logger.clone();
        let cancel_token = write_token.clone();
        // Produced but not yet in the buffer; survives an interrupted write.
        let mut pending: Option<T> = None;

        thread.attach_with_cancel(
            move || {
                if exhausted.load(Ordering::SeqCst) {
                    handle.stop();
                    return;
                }
                let next = match pending.take() {
                    Some(value) => Ok(Some(value)),
                    None => source.produce(),
                };
                match next {
                    Ok(Some(value)) => match buffer.write_position(Some(&write_token)) {
                        Ok(slot) => {
                            slot.set(value);
                            if let Err(e) = slot.commit() {
                                logger.error(&name, &format!("buffer write failed: {}", e));
                                handle.stop();
                            }
                        }
                        Err(StreamError::Interrupted) => pending = Some(value),
                        Err(e) => {
                            logger.error(&name, &format!("buffer write failed: {}", e));
                            handle.stop();
                        }
                    },
                    Ok(None) => {
                        logger.debug(&name, "source exhausted");
                        exhausted.store(true, Ordering::SeqCst);
                        read_token.signal();
                        handle.stop();
                    }
                    Err(e) => {
                        logger.error(&name, &format!("source failed: {}", e));
                        exhausted.store(true, Ordering::SeqCst);
                        read_token.signal();
                        handle.stop();
                    }
                }
            },
            move || cancel_token.signal(),
        );
        self.producer = Some(thread);
    }

    pub fn set_empty_policy(&mut self, policy: EmptyPolicy) {
        self.policy = policy;
    }

    pub fn empty_policy(&self) -> EmptyPolicy {
        self.policy
    }

    pub fn buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.buffer
    }

    pub fn output_slot(&self) -> &Slot<T> {
        &self.output
    }

    /// Whether the attached source has run dry
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    fn drained(&self) -> bool {
        self.buffer.is_empty()
            && (self.policy == EmptyPolicy::EndOfStream || self.exhausted.load(Ordering::SeqCst))
    }
}

impl<T: Payload> Filter for BufferReader<T> {
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
        if self.drained() {
            return Err(StreamError::EndOfStream);
        }

        match self.buffer.read(Some(&self.read_token)) {
            Ok(head) => {
                let value = head.cloned();
                self.buffer.advance_read_position();
                self.output.set(value)
            }
            Err(StreamError::Interrupted) => {
                if self.drained() {
                    Err(StreamError::EndOfStream)
                } else if self.base.lifecycle().is_stopped() {
                    Err(StreamError::Interrupted)
                } else {
                    self.logger
                        .warn(self.base.name(), "read interrupted while running");
                    Err(StreamError::StreamInterrupted)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.base.lifecycle()
    }
}
