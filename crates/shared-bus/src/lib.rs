//! # Shared Bus - Publish/Subscribe Transport
//!
//! The port every messaging layer talks through, plus a process-local broker
//! implementing it.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Process A   │                    │  Process B   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │    Broker    │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe(pattern, group)
//! ```
//!
//! ## Delivery
//!
//! - Subjects are `.`-separated; patterns may use `*` and `>`
//! - Subscriptions in the same queue group share load, one member per message
//! - Every connection exposes a stream of [`TransportEvent`]s

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod subject;
pub mod subscriber;
pub mod transport;

// Re-export main types
pub use broker::{BrokerConnection, InMemoryBroker};
pub use subscriber::Subscription;
pub use transport::{
    ConnectOptions, Connector, ReconnectPolicy, ServerAddrs, SubscriptionId, Transport,
    TransportError, TransportEvent, TransportMessage,
};

/// Connection events to buffer per listener before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
