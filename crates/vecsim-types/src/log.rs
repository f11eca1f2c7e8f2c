//! Leveled index logging.
//!
//! Indexes log through a `LogContext` handed to them at construction. Every
//! message becomes a `tracing` event; when the host registered a `LogSink` the
//! formatted message is forwarded to it as well, so hosts that embed the
//! indexes can route index logs into their own facility.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::VecSimError;

/// Severity of an index log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for formatted index log messages.
///
/// Implementations must be thread-safe: background jobs log from worker threads.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Cheap, cloneable logging handle carried by every index.
#[derive(Clone, Default)]
pub struct LogContext {
    sink: Option<Arc<dyn LogSink>>,
}

impl LogContext {
    /// A context that only emits `tracing` events.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that also forwards every message to `sink`.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let message = fmt::format(args);
        match level {
            LogLevel::Debug => tracing::trace!(target: "vecsim", "{}", message),
            LogLevel::Verbose => tracing::debug!(target: "vecsim", "{}", message),
            LogLevel::Notice => tracing::info!(target: "vecsim", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "vecsim", "{}", message),
        }
        if let Some(sink) = &self.sink {
            sink.log(level, &message);
        }
    }

    pub fn verbose(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Verbose, args);
    }

    pub fn notice(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Notice, args);
    }

    pub fn warning(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warning, args);
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Sink that buffers messages as `"<level>: <prefix><message>"` lines.
#[derive(Debug, Default)]
pub struct MemorySink {
    prefix: String,
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        let line = format!("{}: {}{}", level, self.prefix, message);
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

/// Install a global fmt subscriber; `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str) -> Result<(), VecSimError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| VecSimError::Config(format!("Failed to set tracing subscriber: {}", e)))
}
