//! Stage whose output endpoint is a buffer.
//!
//! `process()` pushes a copy of the input slot into the buffer. An optional
//! [`Sink`] drains the buffer on the writer's own thread.

use super::{Filter, FilterBase};
use crate::buffer::{Interruption, RingBuffer};
use crate::control::{ControlledThread, Lifecycle};
use crate::error::{Result, StreamError};
use crate::logging::{default_logger, Logger};
use crate::stream::{DataSlot, Payload, Slot};
use std::sync::{Arc, Mutex, MutexGuard};

/// Consumer draining a writer's buffer
pub trait Sink<T>: Send {
    fn consume(&mut self, value: &T) -> Result<()>;
}

impl<T, F> Sink<T> for F
where
    F: FnMut(&T) -> Result<()> + Send,
{
    fn consume(&mut self, value: &T) -> Result<()> {
        self(value)
    }
}

type SharedSink<T> = Arc<Mutex<Box<dyn Sink<T>>>>;

fn lock_sink<T>(sink: &SharedSink<T>) -> MutexGuard<'_, Box<dyn Sink<T>>> {
    sink.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct BufferWriter<T: Payload> {
    base: FilterBase,
    input: Slot<T>,
    buffer: Arc<RingBuffer<T>>,
    write_token: Interruption,
    sink: Option<SharedSink<T>>,
    consumer: Option<ControlledThread>,
    logger: Logger,
}

impl<T: Payload> BufferWriter<T> {
    pub fn new(name: impl Into<String>, buffer: Arc<RingBuffer<T>>) -> Self {
        Self::with_logger(name, buffer, default_logger())
    }

    pub fn with_logger(name: impl Into<String>, buffer: Arc<RingBuffer<T>>, logger: Logger) -> Self {
        let base = FilterBase::new(name);
        let write_token = buffer.create_write_interruption();
        base.lifecycle().watch(write_token.clone());
        let input = Slot::new(format!("{}.in", base.name()));
        Self {
            base,
            input,
            buffer,
            write_token,
            sink: None,
            consumer: None,
            logger,
        }
    }

    /// Writer whose buffer is drained by `sink` on a dedicated thread
    pub fn with_sink<S>(
        name: impl Into<String>,
        buffer: Arc<RingBuffer<T>>,
        sink: S,
        logger: Logger,
    ) -> Self
    where
        S: Sink<T> + 'static,
    {
        let mut writer = Self::with_logger(name, buffer, logger);
        writer.attach_sink(Box::new(sink));
        writer
    }

    fn attach_sink(&mut self, sink: Box<dyn Sink<T>>) {
        let sink: SharedSink<T> = Arc::new(Mutex::new(sink));
        let name = format!("{}-sink", self.base.name());
        let thread = ControlledThread::with_logger(name.clone(), self.logger.clone());
        let handle = thread.handle();

        let read_token = self.buffer.create_read_interruption();
        self.base.lifecycle().watch(read_token.clone());
        self.base.lifecycle().drive(thread.handle());

        let buffer = Arc::clone(&self.buffer);
        let consumer_sink = Arc::clone(&sink);
        let logger = self.logger.clone();
        let cancel_token = read_token.clone();

        thread.attach_with_cancel(
            move || match buffer.read(Some(&read_token)) {
                Ok(head) => {
                    let result = head.with(|value| lock_sink(&consumer_sink).consume(value));
                    buffer.advance_read_position();
                    if let Err(e) = result {
                        logger.error(&name, &format!("sink failed: {}", e));
                        handle.stop();
                    }
                }
                Err(StreamError::Interrupted) => {}
                Err(e) => {
                    logger.error(&name, &format!("buffer read failed: {}", e));
                    handle.stop();
                }
            },
            move || cancel_token.signal(),
        );

        self.sink = Some(sink);
        self.consumer = Some(thread);
    }

    pub fn buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.buffer
    }

    pub fn input_slot(&self) -> &Slot<T> {
        &self.input
    }

    /// Hand what is left in the buffer to the sink on the calling thread.
    ///
    /// Only valid once the consumer thread is parked in `Stopped`; returns the
    /// number of values consumed.
    pub fn flush(&self) -> Result<usize> {
        let sink = self.sink.as_ref().ok_or_else(|| {
            StreamError::Unsupported(format!("writer '{}' has no sink", self.base.name()))
        })?;
        if let Some(consumer) = &self.consumer {
            if !consumer.state().is_stopped() {
                return Err(StreamError::InvalidState(format!(
                    "writer '{}' flushed while its consumer runs",
                    self.base.name()
                )));
            }
            consumer.wait_for_suspend();
        }

        let mut flushed = 0;
        while let Some(value) = self.buffer.try_read_clone() {
            lock_sink(sink).consume(&value)?;
            flushed += 1;
        }
        if flushed > 0 {
            self.logger
                .debug(self.base.name(), &format!("flushed {} values", flushed));
        }
        Ok(flushed)
    }
}

impl<T: Payload> Filter for BufferWriter<T> {
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
        let value = self.input.get()?;
        match self.buffer.write(value, Some(&self.write_token)) {
            Ok(()) => Ok(()),
            Err(StreamError::Interrupted) if self.base.lifecycle().is_stopped() => {
                Err(StreamError::Interrupted)
            }
            Err(StreamError::Interrupted) => Err(StreamError::StreamInterrupted),
            Err(e) => Err(e),
        }
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.base.lifecycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::null_logger;
    use crate::stream::Stream;
    use std::time::Duration;

    #[test]
    fn test_process_copies_input_into_buffer() {
        let buffer = Arc::new(RingBuffer::<u32>::new(4).unwrap());
        let mut writer = BufferWriter::with_logger("writer", buffer.clone(), null_logger());
        assert!(!writer.is_connected());
        assert!(matches!(writer.process(), Err(StreamError::NotConnected(_))));

        let source = Stream::new("src", 11_u32);
        writer.input_mut().unwrap().connect(&source.clone().into_any()).unwrap();
        writer.process().unwrap();
        source.set(12);
        writer.process().unwrap();

        assert_eq!(buffer.try_read_clone(), Some(11));
        assert_eq!(buffer.try_read_clone(), Some(12));
    }

    #[test]
    fn test_stop_unblocks_full_buffer() {
        let buffer = Arc::new(RingBuffer::<u32>::new(2).unwrap());
        buffer.write(1, None).unwrap();
        buffer.write(2, None).unwrap();
        let mut writer = BufferWriter::with_logger("writer", buffer, null_logger());
        writer.input_mut().unwrap().connect(&Stream::new("src", 3_u32).into_any()).unwrap();
        let lifecycle = writer.lifecycle().clone();
        lifecycle.start().unwrap();

        let worker = std::thread::spawn(move || writer.process());
        std::thread::sleep(Duration::from_millis(20));
        lifecycle.stop();
        assert!(matches!(worker.join().unwrap(), Err(StreamError::Interrupted)));
    }

    #[test]
    fn test_sink_thread_and_flush() {
        let buffer = Arc::new(RingBuffer::<u32>::new(8).unwrap());
        let collected = Arc::new(Mutex::new(Vec::new()));
        let out = collected.clone();
        let mut writer = BufferWriter::with_sink(
            "writer",
            buffer.clone(),
            move |v: &u32| -> Result<()> {
                out.lock().unwrap().push(*v);
                Ok(())
            },
            null_logger(),
        );
        assert!(writer.flush().is_ok());

        let source = Stream::new("src", 0_u32);
        writer.input_mut().unwrap().connect(&source.clone().into_any()).unwrap();
        writer.lifecycle().start().unwrap();
        for v in 1..=3 {
            source.set(v);
            writer.process().unwrap();
        }
        std::thread::sleep(Duration::from_millis(30));
        writer.lifecycle().stop();
        writer.lifecycle().wait_for_suspend();

        buffer.write(4, None).unwrap();
        assert_eq!(writer.flush().unwrap(), 1);
        assert_eq!(*collected.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
