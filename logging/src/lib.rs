#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Leveled logging with pluggable outputs, shared by all experiment modules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

mod output;

pub use output::{ConsoleOutput, JsonFileOutput, LogOutput, MemoryOutput};

/// Message severity, ordered from chattiest to most critical.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Severity {
    /// Execution tracing, printed with file and line.
    Trace,
    /// Debug details, printed with file and line.
    Debug,
    /// Low-importance information.
    Notice,
    /// Regular information.
    Info,
    /// Application status and phase changes.
    Status,
    /// Something suspicious, execution continues.
    Warning,
    /// Something failed, the caller should wind down.
    Error,
    /// No chance to continue execution.
    Fatal,
}

impl Severity {
    /// Upper-case tag used on every output line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Notice => "NOTICE",
            Self::Info => "INFO",
            Self::Status => "STATUS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Maps a numeric level (e.g. from the command line) to a severity.
    /// Values above the scale clamp to [`Self::Fatal`].
    #[must_use]
    pub const fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Notice,
            3 => Self::Info,
            4 => Self::Status,
            5 => Self::Warning,
            6 => Self::Error,
            _ => Self::Fatal,
        }
    }

    /// Numeric level of this severity (0..=7).
    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    /// One step stricter, clamped at [`Self::Fatal`].
    #[must_use]
    pub const fn raised(self) -> Self {
        Self::from_level(self.level().saturating_add(1))
    }

    /// One step chattier, clamped at [`Self::Trace`].
    #[must_use]
    pub const fn lowered(self) -> Self {
        Self::from_level(self.level().saturating_sub(1))
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single log message together with its call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source file the message originated from.
    pub source_file: String,
    /// Source line the message originated from.
    pub source_line: u32,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        severity: Severity,
        source_file: impl Into<String>,
        source_line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            source_file: source_file.into(),
            source_line,
        }
    }
}

/// Fan-out logger: every message goes to all registered outputs whose
/// threshold admits it.
#[derive(Default)]
pub struct Logger {
    outputs: RwLock<Vec<Arc<dyn LogOutput>>>,
}

impl Logger {
    /// Creates a logger with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an additional output.
    pub fn add_output(&self, output: Arc<dyn LogOutput>) {
        self.outputs.write().push(output);
    }

    /// Sends a message to every output whose threshold admits it.
    /// Prefer the [`klog!`] macro, which fills in the call site.
    pub fn log(&self, severity: Severity, file: &str, line: u32, message: impl Into<String>) {
        let record = LogRecord::new(severity, file, line, message);
        for output in self.outputs.read().iter() {
            if record.severity >= output.level() {
                output.write(&record);
            }
        }
    }

    /// Sets the threshold of every registered output.
    pub fn set_severity_level(&self, level: Severity) {
        for output in self.outputs.read().iter() {
            output.set_level(level);
        }
    }

    /// Raises the threshold of every registered output by one step.
    pub fn increment_severity_level(&self) {
        for output in self.outputs.read().iter() {
            output.increment_level();
        }
    }

    /// Lowers the threshold of every registered output by one step.
    pub fn decrement_severity_level(&self) {
        for output in self.outputs.read().iter() {
            output.decrement_level();
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("outputs", &self.outputs.read().len())
            .finish()
    }
}

/// Logs through a [`Logger`], capturing the call site.
///
/// ```
/// use kestrel_logging::{klog, Logger, Severity};
///
/// let logger = Logger::new();
/// klog!(logger, Severity::Info, "loaded {} samples", 10);
/// ```
#[macro_export]
macro_rules! klog {
    ($logger:expr, $severity:expr, $($arg:tt)+) => {
        $logger.log($severity, file!(), line!(), format!($($arg)+))
    };
}

/// Logs a warning naming the failed expression. Diagnostic only, never
/// panics.
#[macro_export]
macro_rules! kcheck {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            $crate::klog!(
                $logger,
                $crate::Severity::Warning,
                "check failed: `{}`",
                stringify!($cond)
            );
        }
    };
}
