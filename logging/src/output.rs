//! Output sinks the logger fans out to.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use parking_lot::Mutex;

use crate::{LogRecord, Severity};

/// A log sink with its own severity threshold. Records below the threshold
/// are never handed to [`LogOutput::write`].
pub trait LogOutput: Send + Sync {
    /// Emits a single record.
    fn write(&self, record: &LogRecord);

    /// Current threshold of this output.
    fn level(&self) -> Severity;

    /// Replaces the threshold of this output.
    fn set_level(&self, level: Severity);

    /// Raises the threshold by one step, clamped at [`Severity::Fatal`].
    fn increment_level(&self) {
        self.set_level(self.level().raised());
    }

    /// Lowers the threshold by one step, clamped at [`Severity::Trace`].
    fn decrement_level(&self) {
        self.set_level(self.level().lowered());
    }
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

/// Colored terminal output.
#[derive(Debug)]
pub struct ConsoleOutput {
    level: Mutex<Severity>,
}

impl ConsoleOutput {
    /// Creates a console output with the given threshold.
    #[must_use]
    pub const fn new(level: Severity) -> Self {
        Self {
            level: Mutex::new(level),
        }
    }

    const fn color(severity: Severity) -> (&'static str, &'static str) {
        match severity {
            Severity::Trace => (CYAN, ""),
            Severity::Debug => (CYAN, BOLD),
            Severity::Notice => ("", ""),
            Severity::Info => (GREEN, ""),
            Severity::Status => (GREEN, BOLD),
            Severity::Warning => (YELLOW, ""),
            Severity::Error => (RED, ""),
            Severity::Fatal => (RED, BOLD),
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

impl LogOutput for ConsoleOutput {
    fn write(&self, record: &LogRecord) {
        let (color, weight) = Self::color(record.severity);
        let tag = record.severity.label();
        match record.severity {
            Severity::Trace | Severity::Debug => println!(
                "{color}{weight}{tag}{RESET} in {} [{color}{weight}{}{RESET}]: {}",
                record.source_file, record.source_line, record.message
            ),
            _ => println!("{color}{weight}{tag}{RESET}: {}", record.message),
        }
    }

    fn level(&self) -> Severity {
        *self.level.lock()
    }

    fn set_level(&self, level: Severity) {
        *self.level.lock() = level;
    }
}

/// Append-only JSON-lines file output.
#[derive(Debug)]
pub struct JsonFileOutput {
    path: PathBuf,
    writer: Mutex<File>,
    level: Mutex<Severity>,
}

impl JsonFileOutput {
    /// Creates or opens the log file at the desired path.
    pub fn new(path: impl AsRef<Path>, level: Severity) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
            level: Mutex::new(level),
        })
    }

    /// Returns the underlying file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogOutput for JsonFileOutput {
    fn write(&self, record: &LogRecord) {
        let mut writer = self.writer.lock();
        if serde_json::to_writer(&mut *writer, record).is_ok() {
            let _ = writer.write_all(b"\n");
            let _ = writer.flush();
        }
    }

    fn level(&self) -> Severity {
        *self.level.lock()
    }

    fn set_level(&self, level: Severity) {
        *self.level.lock() = level;
    }
}

/// In-memory output retaining every admitted record (for tests and
/// diagnostics snapshots).
#[derive(Debug)]
pub struct MemoryOutput {
    level: Mutex<Severity>,
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryOutput {
    /// Creates a memory output with the given threshold.
    #[must_use]
    pub const fn new(level: Severity) -> Self {
        Self {
            level: Mutex::new(level),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the records retained so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}

impl LogOutput for MemoryOutput {
    fn write(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }

    fn level(&self) -> Severity {
        *self.level.lock()
    }

    fn set_level(&self, level: Severity) {
        *self.level.lock() = level;
    }
}
