//! Connection services.
//!
//! `connection` is the public surface; the other modules hang behaviour off
//! the shared connection state.

pub mod connection;
pub mod correlation;
mod dispatch;
mod drain;
pub mod hooks;
mod transport_events;

pub use connection::{Connection, ConnectionBuilder};
pub use correlation::{CallStats, PendingCall, PendingCalls};
pub use hooks::{HandlerErrorHook, HandlerFailure, Hooks, TransportErrorHook};
