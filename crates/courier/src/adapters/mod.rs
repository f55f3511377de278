//! Adapters implementing Courier's ports.

pub mod memory_logger;
pub mod tracing_logger;
pub mod typed_validator;

pub use memory_logger::{LogEntry, LogLevel, MemoryLogger};
pub use tracing_logger::{NoopLogger, TracingLogger};
pub use typed_validator::{TypedValidator, INVALID_DATA};
