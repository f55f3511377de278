//! # Subscriber
//!
//! Defines the subscription side of the transport.

use crate::transport::{SubscriptionId, TransportMessage};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// A subscription handle for receiving messages.
///
/// The stream ends when the subscription is removed from the transport or the
/// connection closes. Messages already buffered are still delivered.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    pattern: String,
    queue_group: Option<String>,
    receiver: mpsc::UnboundedReceiver<TransportMessage>,
}

impl Subscription {
    /// Create a new subscription handle.
    #[must_use]
    pub fn new(
        id: SubscriptionId,
        pattern: impl Into<String>,
        queue_group: Option<String>,
        receiver: mpsc::UnboundedReceiver<TransportMessage>,
    ) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            queue_group,
            receiver,
        }
    }

    /// Receive the next message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message
    /// - `None` - The subscription was removed or the connection closed
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.receiver.recv().await
    }

    /// Try to receive the next message without waiting.
    pub fn try_recv(&mut self) -> Option<TransportMessage> {
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The pattern this subscription was registered with.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }
}

impl Stream for Subscription {
    type Item = TransportMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
