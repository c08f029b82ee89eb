//! Diagnostic logging with pluggable sinks.
//!
//! Every decision point and remote-call outcome in the pipeline is reported
//! through a [`Logger`], which fans out to one or more [`DiagnosticSink`]s:
//! - [`TracingSink`]: stderr/stdout/file via tracing (always present by default)
//! - [`FileSink`]: durable append-only diagnostic log with timestamped lines
//! - [`MemorySink`]: in-memory capture so tests can assert on diagnostics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Atomic minimum-level filter shared between loggers.
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub fn get(&self) -> LogLevel {
        u8_to_level(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: LogLevel) {
        self.0.store(level as u8, Ordering::Relaxed);
    }

    /// Check if a message at the given level should be logged.
    pub fn should_log(&self, level: LogLevel) -> bool {
        level as u8 >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

fn u8_to_level(val: u8) -> LogLevel {
    match val {
        0 => LogLevel::Debug,
        1 => LogLevel::Info,
        2 => LogLevel::Warning,
        3 => LogLevel::Error,
        _ => LogLevel::Debug,
    }
}

/// Convert a diagnostic level to a tracing level.
pub fn log_level_to_tracing(level: LogLevel) -> Level {
    match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warning => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Destination for diagnostic entries. Sinks are write-only.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, entry: &DiagnosticEntry);
}

/// Forwards diagnostics to the global tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, entry: &DiagnosticEntry) {
        let logger = entry.logger.as_deref().unwrap_or("bridge");
        let data = entry
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        match log_level_to_tracing(entry.level) {
            Level::ERROR => tracing::error!(logger = %logger, data = %data, "{}", entry.message),
            Level::WARN => tracing::warn!(logger = %logger, data = %data, "{}", entry.message),
            Level::INFO => tracing::info!(logger = %logger, data = %data, "{}", entry.message),
            _ => tracing::debug!(logger = %logger, data = %data, "{}", entry.message),
        }
    }
}

/// Append-only diagnostic log file.
///
/// Each entry becomes one line: `YYYY-MM-DD HH:MM:SS - LEVEL message {data}`.
/// The file is opened in append mode per write and closed again, so nothing
/// is held open between requests.
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format_line(entry: &DiagnosticEntry) -> String {
        let mut line = format!(
            "{} - {} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level.as_str(),
            entry.message
        );
        if let Some(ref data) = entry.data {
            line.push(' ');
            line.push_str(&data.to_string());
        }
        line.push('\n');
        line
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, entry: &DiagnosticEntry) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let line = Self::format_line(entry);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), "Failed to write diagnostic log: {}", e);
        }
    }
}

/// Captures entries in memory.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    /// True if any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }

    /// Entries at `level` or above.
    pub fn at_least(&self, level: LogLevel) -> Vec<DiagnosticEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.level >= level)
            .collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, entry: &DiagnosticEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// Logger that fans diagnostics out to every configured sink.
#[derive(Clone)]
pub struct Logger {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
    /// Minimum level to log.
    level_filter: Arc<LogLevelFilter>,
    /// Logger name/category.
    name: Option<String>,
}

impl Logger {
    /// Create a logger that writes to tracing only.
    pub fn new() -> Self {
        Self {
            sinks: vec![Arc::new(TracingSink)],
            level_filter: Arc::new(LogLevelFilter::default()),
            name: None,
        }
    }

    /// Create a logger with no sinks attached.
    pub fn silent() -> Self {
        Self {
            sinks: Vec::new(),
            level_filter: Arc::new(LogLevelFilter::default()),
            name: None,
        }
    }

    /// Add a sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Set the level filter.
    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    /// Set the logger name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Derive a logger for a sub-component, sharing sinks and filter.
    pub fn child(&self, name: &str) -> Self {
        let name = match self.name {
            Some(ref parent) => format!("{}:{}", parent, name),
            None => name.to_string(),
        };
        Self {
            sinks: self.sinks.clone(),
            level_filter: Arc::clone(&self.level_filter),
            name: Some(name),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str, data: Option<Value>) {
        if !self.level_filter.should_log(level) {
            return;
        }
        let entry = DiagnosticEntry {
            timestamp: Utc::now(),
            level,
            logger: self.name.clone(),
            message: message.to_string(),
            data,
        };
        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Log a message with structured data.
    pub fn log_with_data(&self, level: LogLevel, message: &str, data: Value) {
        self.log(level, message, Some(data));
    }

    pub fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg, None);
    }

    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg, None);
    }

    pub fn warning(&self, msg: &str) {
        self.log(LogLevel::Warning, msg, None);
    }

    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg, None);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
