//! In-memory `MessageLogger` that records every entry, for tests and
//! diagnostics endpoints.

use crate::ports::outbound::MessageLogger;
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub fields: Value,
}

#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries so far.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries at `level` whose message equals `message`.
    #[must_use]
    pub fn find(&self, level: LogLevel, message: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level && entry.message == message)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count(&self, level: LogLevel) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, level: LogLevel, message: &str, fields: Value) {
        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
            fields,
        });
    }
}

impl MessageLogger for MemoryLogger {
    fn info(&self, message: &str, fields: Value) {
        self.push(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: Value) {
        self.push(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: Value) {
        self.push(LogLevel::Error, message, fields);
    }
}
