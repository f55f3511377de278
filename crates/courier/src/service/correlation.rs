//! Correlation engine.
//!
//! Pairs outgoing requests with their replies. Every connection owns one
//! wildcard subscription on its reply inbox (`<prefix>.<token>.*`); each call
//! publishes with a fresh reply subject under it and parks a oneshot sender in
//! [`PendingCalls`], keyed by that subject.
//!
//! Flow:
//! 1. `register()` parks a sender and returns the receiver
//! 2. The request is published with the reply subject
//! 3. The inbox reader decodes the reply and calls `complete()`
//! 4. On timeout the caller calls `cancel()`
//!
//! Whoever removes the entry from the map resolves the call. If the timeout
//! fires but `cancel()` finds the entry gone, the reply won and is already in
//! the channel.

use courier_telemetry::metrics;
use dashmap::DashMap;
use serde_json::{json, Value};
use shared_bus::Subscription;
use shared_types::{decode, Encoded, Envelope, RpcError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::error::{CourierError, CourierResult};
use crate::domain::lifecycle::MessageKind;
use crate::ports::outbound::MessageLogger;
use crate::service::connection::Shared;

/// What the inbox reader hands to a waiting call.
pub(crate) type ReplyOutcome = Result<Envelope, RpcError>;

/// Statistics for the pending call store
#[derive(Debug, Default)]
pub struct CallStats {
    /// Total calls registered
    pub registered: AtomicU64,
    /// Total calls resolved by a reply
    pub completed: AtomicU64,
    /// Total calls resolved by timeout
    pub timeouts: AtomicU64,
    /// Replies that arrived for no pending call
    pub orphaned: AtomicU64,
}

/// Reply subject → waiting call.
#[derive(Default)]
pub struct PendingCalls {
    pending: DashMap<String, oneshot::Sender<ReplyOutcome>>,
    stats: CallStats,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a call under `reply_subject`.
    pub fn register(&self, reply_subject: &str) -> oneshot::Receiver<ReplyOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(reply_subject.to_string(), tx);
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        rx
    }

    /// Resolve the call parked under `reply_subject`.
    ///
    /// Returns true if this resolved the call, false if it was unknown or
    /// already resolved.
    pub fn complete(&self, reply_subject: &str, outcome: ReplyOutcome) -> bool {
        match self.pending.remove(reply_subject) {
            Some((_, sender)) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                // A dropped receiver means the caller went away; nothing to do.
                let _ = sender.send(outcome);
                true
            }
            None => {
                self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                debug!(reply_subject, "Reply for unknown or expired call");
                false
            }
        }
    }

    /// Withdraw the call parked under `reply_subject` because its deadline
    /// passed. Returns true if the timeout won.
    pub fn cancel(&self, reply_subject: &str) -> bool {
        let won = self.pending.remove(reply_subject).is_some();
        if won {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        won
    }

    /// Withdraw a call that never made it onto the wire.
    pub fn forget(&self, reply_subject: &str) {
        self.pending.remove(reply_subject);
    }

    /// Get number of currently pending calls
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> &CallStats {
        &self.stats
    }
}

/// A call in flight.
///
/// The request id is known before the reply arrives. Await to get the
/// outcome; dropping it does not cancel the call.
#[must_use = "a call does nothing observable unless awaited"]
pub struct PendingCall<T> {
    request_id: String,
    receiver: oneshot::Receiver<CourierResult<T>>,
}

impl<T> PendingCall<T> {
    pub(crate) fn new(request_id: String, receiver: oneshot::Receiver<CourierResult<T>>) -> Self {
        Self {
            request_id,
            receiver,
        }
    }

    /// Id of the request envelope.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl<T> Future for PendingCall<T> {
    type Output = CourierResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CourierError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Shared {
    /// Publish a request parked under `reply_subject` and wait for its reply
    /// or the deadline, whichever removes the pending entry first.
    pub(crate) async fn round_trip(
        &self,
        topic: &str,
        reply_subject: &str,
        encoded: Encoded,
        data: &Value,
        timeout: Duration,
        mut replies: oneshot::Receiver<ReplyOutcome>,
    ) -> CourierResult<Envelope> {
        if let Err(err) = self
            .publish(topic, Some(reply_subject), encoded, MessageKind::Request)
            .await
        {
            self.pending.forget(reply_subject);
            return Err(err);
        }

        let waited = tokio::time::timeout(timeout, &mut replies).await;
        let outcome = match waited {
            Ok(received) => received,
            Err(_) if self.pending.cancel(reply_subject) => {
                metrics::CALL_TIMEOUTS.inc();
                debug!(topic, timeout_ms = timeout.as_millis() as u64, "Call timed out");
                return Err(RpcError::timeout(topic, data, timeout.as_millis()).into());
            }
            // The reply removed the entry first and is already in the channel.
            Err(_) => replies.await,
        };

        match outcome {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(CourierError::Abandoned),
        }
    }
}

/// Route replies arriving on the inbox subscription to their calls.
///
/// Undecodable replies resolve the call with the protocol error. Ends when
/// the inbox subscription ends.
pub(crate) fn spawn_inbox_reader(
    mut inbox: Subscription,
    pending: Arc<PendingCalls>,
    message_logger: Arc<dyn MessageLogger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            let outcome = decode(&message.payload);
            match &outcome {
                Ok(envelope) => {
                    metrics::record_received(MessageKind::Response.as_str());
                    message_logger.info(
                        "message received",
                        json!({
                            "type": MessageKind::Response.as_str(),
                            "topic": message.subject,
                            "message": envelope,
                        }),
                    );
                }
                Err(err) => {
                    metrics::PROTOCOL_ERRORS.inc();
                    warn!(subject = %message.subject, error = %err, "Undecodable reply");
                }
            }
            pending.complete(&message.subject, outcome);
        }
        debug!(pattern = inbox.pattern(), "Reply inbox closed");
    })
}
