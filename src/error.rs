//! Error handling for streamflow
//!
//! This module defines the crate error type and a Result alias used by the
//! buffers, threads, filters, pipelines and playback clocks.
//!
//! Configuration failures (wiring, sizing) are returned synchronously from the
//! call that caused them. Steady-state failures travel through
//! [`crate::pipeline::Pipeline::step`], which turns them into an orderly stop.

use thiserror::Error;

/// Main error type for streamflow operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// A blocking buffer wait was cancelled by an interruption token
    #[error("Blocking wait interrupted")]
    Interrupted,

    /// A stage has no more data and asks the pipeline to stop
    #[error("End of stream")]
    EndOfStream,

    /// A stage aborted the current tick; the pipeline keeps running
    #[error("Stream interrupted")]
    StreamInterrupted,

    /// Two endpoints carry different payload types
    #[error("Incompatible stream type: expected {expected}, found {found}")]
    IncompatibleStreamType {
        expected: &'static str,
        found: &'static str,
    },

    /// Pipeline or buffer configuration is not usable
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A slot was accessed before being connected to a stream
    #[error("Slot not connected: {0}")]
    NotConnected(String),

    /// Accessor called on a pipeline without stages
    #[error("Pipeline has no stages")]
    EmptyPipeline,

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation not supported by this component or mode
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Failure reported by a concrete stage
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a stage failure
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StreamError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Strip any context wrappers
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error only aborts the current tick
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root(),
            StreamError::Interrupted | StreamError::StreamInterrupted
        )
    }

    /// Whether the error signals a graceful end of the stream
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.root(), StreamError::EndOfStream)
    }
}

/// Result type alias for streamflow operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
