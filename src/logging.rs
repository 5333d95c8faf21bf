//! Injected logging collaborator.
//!
//! Components that report diagnostics hold a [`Logger`] instead of calling the
//! global `tracing` macros from their control flow. The default sink forwards
//! to `tracing`; tests use [`NullSink`] or capture entries with [`MemorySink`].
//!
//! [`init_tracing`] installs the process-wide subscriber used by the binary.

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{Result, StreamError};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Destination for leveled diagnostic messages.
pub trait LogSink: Send + Sync {
    /// Record one message emitted by `component`.
    fn log(&self, level: LogLevel, component: &str, message: &str);

    fn trace(&self, component: &str, message: &str) {
        self.log(LogLevel::Trace, component, message);
    }

    fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(LogLevel::Warn, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }
}

/// Shared handle to a log sink
pub type Logger = Arc<dyn LogSink>;

/// Sink forwarding every entry to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(component, "{}", message),
            LogLevel::Debug => tracing::debug!(component, "{}", message),
            LogLevel::Info => tracing::info!(component, "{}", message),
            LogLevel::Warn => tracing::warn!(component, "{}", message),
            LogLevel::Error => tracing::error!(component, "{}", message),
        }
    }
}

/// Sink discarding everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _component: &str, _message: &str) {}
}

/// One captured entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

/// Sink keeping entries in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether any entry at `level` contains `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LogEntry {
                level,
                component: component.to_string(),
                message: message.to_string(),
            });
    }
}

/// Logger forwarding to `tracing`
pub fn default_logger() -> Logger {
    Arc::new(TracingSink)
}

/// Logger discarding everything
pub fn null_logger() -> Logger {
    Arc::new(NullSink)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter directive. When a log file is
/// configured, a non-blocking file layer is added; keep the returned guard
/// alive for the lifetime of the process so buffered lines get flushed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| StreamError::Config(format!("Invalid log filter: {}", e)))?;

    let stdout_layer = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                StreamError::Config(format!("Log file path {:?} has no file name", path))
            })?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| StreamError::Config(format!("Failed to install subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.info("pipeline", "started");
        sink.error("reader", "buffer closed");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].component, "reader");
        assert!(sink.contains(LogLevel::Error, "closed"));
        assert!(!sink.contains(LogLevel::Warn, "closed"));

        sink.clear();
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
    }

    #[test]
    fn test_null_sink_is_silent() {
        let logger = null_logger();
        logger.warn("anything", "goes nowhere");
    }
}
