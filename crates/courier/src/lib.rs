//! # Courier
//!
//! Request/reply and event messaging over a subject-based publish/subscribe
//! broker.
//!
//! ## Purpose
//!
//! Every message travels inside a versioned JSON envelope
//! (`{v, id, fid?, ts, data?, err?}`). On top of that the connection offers:
//!
//! | Pattern | Sender | Receiver |
//! |---------|--------|----------|
//! | Event | `emit` / `emit_event` | `listen` (grouped), `listen_broadcast` |
//! | Method | `call` / `call_method` | `register_method` (grouped) |
//! | Fire and forget | `call_method_and_forget` | `register_method` |
//! | Raw topic | `emit` / `call` | `on` |
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement |
//! |-----------|-------------|
//! | Each call resolves exactly once | `service/correlation.rs` - entry removal decides |
//! | Grouped subscribers get each message once | `shared-bus` queue groups |
//! | Invalid input never reaches a handler | `service/dispatch.rs` - validator runs first |
//! | Handler faults become `INTERNAL_ERROR` replies | `service/dispatch.rs` - `catch_unwind` |
//! | `close()` waits for in-flight work | `service/drain.rs` + `domain/counter.rs` |
//!
//! ## Lifecycle
//!
//! ```text
//! [OPEN] ──close()──→ [DRAINING] ──in flight = 0──→ [CLOSED]
//! ```
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - tracing/memory loggers, typed validator            │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - Handler, Validator                         │
//! │  ports/outbound.rs - MessageLogger                              │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service/ - connection, correlation, dispatch, drain, hooks     │
//! │  domain/  - config, errors, lifecycle, handling counter         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let broker = InMemoryBroker::new();
//! let conn = Connection::connect(ConnectionConfig::with_group("greeter"), &broker).await?;
//!
//! conn.register_method(
//!     "hello",
//!     |data, _, _| async move { Ok::<_, RpcError>(format!("hello {}", data["name"])) },
//!     SubscribeOptions::new(),
//! )
//! .await?;
//!
//! let greeting = conn.call_method("hello", &json!({ "name": "Bob" }))?.await?;
//! conn.close().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
pub use service::*;

pub use shared_bus::{Connector, InMemoryBroker, Transport, TransportEvent};
pub use shared_types::{codes, ErrorKind, Envelope, RpcError};
