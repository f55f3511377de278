//! Outbound ports for Courier.

use serde_json::Value;

/// Structured logger for message traffic and handler failures.
///
/// Separate from internal diagnostics (which always go through `tracing`) so
/// applications can route message logs elsewhere or silence them per
/// category.
pub trait MessageLogger: Send + Sync {
    fn info(&self, message: &str, fields: Value);
    fn warn(&self, message: &str, fields: Value);
    fn error(&self, message: &str, fields: Value);
}
