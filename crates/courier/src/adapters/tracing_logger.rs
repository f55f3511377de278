//! `MessageLogger` adapters backed by `tracing`, or by nothing.

use crate::ports::outbound::MessageLogger;
use serde_json::Value;
use tracing::{error, info, warn};

/// Forwards to `tracing` under the `courier::messages` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl MessageLogger for TracingLogger {
    fn info(&self, message: &str, fields: Value) {
        info!(target: "courier::messages", fields = %fields, "{message}");
    }

    fn warn(&self, message: &str, fields: Value) {
        warn!(target: "courier::messages", fields = %fields, "{message}");
    }

    fn error(&self, message: &str, fields: Value) {
        error!(target: "courier::messages", fields = %fields, "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl MessageLogger for NoopLogger {
    fn info(&self, _message: &str, _fields: Value) {}
    fn warn(&self, _message: &str, _fields: Value) {}
    fn error(&self, _message: &str, _fields: Value) {}
}
