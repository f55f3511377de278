//! Domain types for Courier connections.
//!
//! Configuration, lifecycle, errors and the handling counter. Nothing here
//! touches the transport.

pub mod config;
pub mod counter;
pub mod error;
pub mod lifecycle;

// Re-exports for convenience
pub use config::{CallOptions, ConfigError, ConnectionConfig, EmitOptions, ReplyMode};
pub use counter::{HandlingCounter, HandlingGuard};
pub use error::{CourierError, CourierResult};
pub use lifecycle::{ConnectionState, MessageKind};
