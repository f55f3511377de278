//! # Transport Port
//!
//! The boundary to the publish/subscribe transport. Topic matching,
//! reconnection and queue-group load balancing belong to the transport; the
//! layers above only configure them.

use crate::subscriber::Subscription;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// A message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The concrete subject the message was published on.
    pub subject: String,
    /// Reply subject, present on requests that expect an answer.
    pub reply: Option<String>,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Connection-level events emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Reconnecting,
    Reconnected,
    Closed,
    /// A connection-level fault. The connection can no longer be trusted.
    Error(String),
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Reconnected => f.write_str("reconnected"),
            Self::Closed => f.write_str("closed"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was closed.
    #[error("transport connection closed")]
    Closed,

    /// Subject is not publishable.
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    /// Pattern is not subscribable.
    #[error("invalid subscription pattern: {0:?}")]
    InvalidPattern(String),

    /// Initial connection failed.
    #[error("failed to connect: {0}")]
    Connect(String),
}

/// Transport-assigned subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// Endpoints to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddrs {
    Single(String),
    /// Multi-endpoint configuration; the transport picks among them.
    Cluster(Vec<String>),
}

impl ServerAddrs {
    /// All endpoints in order.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        match self {
            Self::Single(url) => vec![url.as_str()],
            Self::Cluster(urls) => urls.iter().map(String::as_str).collect(),
        }
    }
}

/// Reconnection behaviour handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Fail on the first connect error and never reconnect.
    Disabled,
    /// Fail on the first connect error, reconnect forever after a disconnect.
    OnDisconnect { wait: Duration },
    /// Wait for the first connect and reconnect forever.
    Always { wait: Duration },
}

impl ReconnectPolicy {
    /// Retry the initial connection instead of failing.
    #[must_use]
    pub fn wait_on_first_connect(&self) -> bool {
        matches!(self, Self::Always { .. })
    }

    /// Reconnect after a disconnect.
    #[must_use]
    pub fn reconnects(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// `None` means unlimited.
    #[must_use]
    pub fn max_reconnect_attempts(&self) -> Option<u32> {
        match self {
            Self::Disabled => Some(0),
            _ => None,
        }
    }
}

/// Options for establishing a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub servers: ServerAddrs,
    pub reconnect: ReconnectPolicy,
}

/// A live connection to the publish/subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `subject`, optionally naming a reply subject.
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Subscribe to `pattern`. Subscriptions sharing a queue group on the same
    /// pattern compete: each message goes to exactly one member.
    async fn subscribe(
        &self,
        pattern: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, TransportError>;

    /// Remove a subscription. Its stream ends once buffered messages drain.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// A fresh, unpredictable reply subject under `prefix`.
    fn new_inbox(&self, prefix: &str) -> String;

    /// Wait until everything published so far has been handed to the broker.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Stream of connection-level events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Establishes transport connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Transport>, TransportError>;
}
