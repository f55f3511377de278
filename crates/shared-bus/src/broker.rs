//! # In-Memory Broker
//!
//! A process-local publish/subscribe broker implementing [`Transport`].
//!
//! Every [`BrokerConnection`] obtained from the same [`InMemoryBroker`] sees
//! the same subject space, so several connections in one process behave like
//! several processes attached to one broker. Suitable for tests and
//! single-node operation; distributed deployments plug a network transport in
//! behind the same trait.
//!
//! ## Delivery rules
//!
//! - A subscription without a queue group receives every matching message.
//! - Subscriptions sharing a queue group on the same pattern compete: each
//!   message goes to exactly one live member, chosen round-robin.

use crate::subject;
use crate::subscriber::Subscription;
use crate::transport::{
    ConnectOptions, Connector, SubscriptionId, Transport, TransportError, TransportEvent,
    TransportMessage,
};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

struct SubscriptionEntry {
    id: SubscriptionId,
    connection: u64,
    pattern: String,
    queue_group: Option<String>,
    sender: mpsc::UnboundedSender<TransportMessage>,
}

struct BrokerState {
    /// Live subscriptions across all connections.
    subscriptions: RwLock<Vec<SubscriptionEntry>>,

    /// Round-robin cursor per (pattern, queue group).
    queue_cursors: Mutex<HashMap<(String, String), usize>>,

    /// Event senders of live connections.
    connections: Mutex<HashMap<u64, broadcast::Sender<TransportEvent>>>,

    next_subscription: AtomicU64,
    next_connection: AtomicU64,

    /// Total messages published.
    messages_published: AtomicU64,

    /// When false, new connections are refused.
    available: AtomicBool,

    /// Event channel capacity per connection.
    capacity: usize,
}

impl BrokerState {
    /// Deliver a message to every matching subscription, honouring queue
    /// groups. Returns the number of subscriptions that received it.
    fn route(&self, message: TransportMessage) -> usize {
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let subscriptions = self.subscriptions.read();
        let mut delivered = 0;
        let mut groups: HashMap<(&str, &str), Vec<&SubscriptionEntry>> = HashMap::new();

        for entry in subscriptions
            .iter()
            .filter(|entry| subject::matches(&entry.pattern, &message.subject))
        {
            match entry.queue_group.as_deref() {
                None => {
                    if entry.sender.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Some(group) => groups
                    .entry((entry.pattern.as_str(), group))
                    .or_default()
                    .push(entry),
            }
        }

        for ((pattern, group), members) in groups {
            let start = {
                let mut cursors = self.queue_cursors.lock();
                let cursor = cursors
                    .entry((pattern.to_string(), group.to_string()))
                    .or_insert(0);
                let start = *cursor;
                *cursor = cursor.wrapping_add(1);
                start
            };

            // First live member from the cursor onwards
            let chosen = (0..members.len())
                .map(|offset| members[(start + offset) % members.len()])
                .find(|member| member.sender.send(message.clone()).is_ok());

            match chosen {
                Some(member) => {
                    trace!(subject = %message.subject, group, sid = %member.id, "Queue member chosen");
                    delivered += 1;
                }
                None => debug!(subject = %message.subject, group, "No live queue member"),
            }
        }

        delivered
    }

    fn remove_connection(&self, connection: u64) {
        self.subscriptions
            .write()
            .retain(|entry| entry.connection != connection);
        self.connections.lock().remove(&connection);
    }
}

/// Process-local broker. Cheap to clone; clones share the subject space.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create a broker with the default event channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker with the given event channel capacity per connection.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(BrokerState {
                subscriptions: RwLock::new(Vec::new()),
                queue_cursors: Mutex::new(HashMap::new()),
                connections: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                next_connection: AtomicU64::new(1),
                messages_published: AtomicU64::new(0),
                available: AtomicBool::new(true),
                capacity,
            }),
        }
    }

    /// Open a new connection.
    #[must_use]
    pub fn connection(&self) -> Arc<BrokerConnection> {
        let id = self.state.next_connection.fetch_add(1, Ordering::Relaxed);
        let (events, _) = broadcast::channel(self.state.capacity);
        self.state.connections.lock().insert(id, events.clone());

        debug!(connection = id, "Broker connection opened");

        Arc::new(BrokerConnection {
            state: Arc::clone(&self.state),
            id,
            closed: AtomicBool::new(false),
            events,
        })
    }

    /// Refuse (`false`) or accept (`true`) new connections.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// Send a connection-level event to every live connection.
    ///
    /// Returns the number of connections that had listeners.
    pub fn broadcast_event(&self, event: TransportEvent) -> usize {
        let connections = self.state.connections.lock();
        connections
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }

    /// Number of live subscriptions across all connections.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.subscriptions.read().len()
    }

    /// Number of live subscriptions on a pattern.
    #[must_use]
    pub fn subscriber_count_for(&self, pattern: &str) -> usize {
        self.state
            .subscriptions
            .read()
            .iter()
            .filter(|entry| entry.pattern == pattern)
            .count()
    }

    /// Total messages published through this broker.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.state.messages_published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn Transport>, TransportError> {
        loop {
            if self.state.available.load(Ordering::SeqCst) {
                break;
            }
            match options.reconnect {
                policy @ crate::transport::ReconnectPolicy::Always { wait }
                    if policy.wait_on_first_connect() =>
                {
                    debug!(servers = ?options.servers.urls(), "Broker unavailable, waiting");
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    return Err(TransportError::Connect(format!(
                        "no broker available at {}",
                        options.servers.urls().join(",")
                    )))
                }
            }
        }

        let connection = self.connection();
        debug!(
            connection = connection.id,
            servers = ?options.servers.urls(),
            reconnect = ?options.reconnect,
            "Connected to in-memory broker"
        );
        let _ = connection.events.send(TransportEvent::Connected);
        Ok(connection)
    }
}

/// One connection to an [`InMemoryBroker`].
pub struct BrokerConnection {
    state: Arc<BrokerState>,
    id: u64,
    closed: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
}

impl BrokerConnection {
    /// Connection id within the broker.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for BrokerConnection {
    async fn publish(
        &self,
        subject: &str,
        reply: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(TransportError::InvalidSubject(subject.to_string()));
        }

        let receivers = self.state.route(TransportMessage {
            subject: subject.to_string(),
            reply: reply.map(str::to_owned),
            payload,
        });

        trace!(subject, receivers, "Message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        pattern: &str,
        queue_group: Option<&str>,
    ) -> Result<Subscription, TransportError> {
        self.ensure_open()?;
        if !subject::is_valid_pattern(pattern) {
            return Err(TransportError::InvalidPattern(pattern.to_string()));
        }

        let id = SubscriptionId(self.state.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();

        self.state.subscriptions.write().push(SubscriptionEntry {
            id,
            connection: self.id,
            pattern: pattern.to_string(),
            queue_group: queue_group.map(str::to_owned),
            sender,
        });

        debug!(connection = self.id, sid = %id, pattern, queue_group, "Subscription created");

        Ok(Subscription::new(
            id,
            pattern,
            queue_group.map(str::to_owned),
            receiver,
        ))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let mut subscriptions = self.state.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|entry| !(entry.id == id && entry.connection == self.id));

        if subscriptions.len() == before {
            warn!(connection = self.id, sid = %id, "Unsubscribe for unknown subscription");
        } else {
            debug!(connection = self.id, sid = %id, "Subscription removed");
        }
        Ok(())
    }

    fn new_inbox(&self, prefix: &str) -> String {
        format!("{prefix}.{}", shared_types::inbox_token())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        // Routing is synchronous; one yield lets woken subscribers run.
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.events.send(TransportEvent::Closed);
        self.state.remove_connection(self.id);
        debug!(connection = self.id, "Broker connection closed");
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.state.remove_connection(self.id);
        }
    }
}
