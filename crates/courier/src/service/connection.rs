//! Connection: the public entry point.
//!
//! A [`Connection`] wraps one transport connection and exposes events
//! (`emit`, `listen`), methods (`call`, `register_method`) and graceful
//! shutdown (`close`). Clones share the same underlying connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let broker = InMemoryBroker::new();
//! let conn = Connection::connect(ConnectionConfig::with_group("api"), &broker).await?;
//!
//! conn.register_method("ping", |_, _, _| async { Ok::<_, RpcError>("pong") }, SubscribeOptions::new()).await?;
//! let pong = conn.call_method("ping", &())?.await?;
//!
//! conn.close().await?;
//! ```

use courier_telemetry::metrics;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use shared_bus::{Connector, SubscriptionId, Transport};
use shared_types::{encode, inbox_token, Encoded, Envelope, RpcError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::tracing_logger::{NoopLogger, TracingLogger};
use crate::domain::config::{CallOptions, ConnectionConfig, EmitOptions, ReplyMode};
use crate::domain::counter::HandlingCounter;
use crate::domain::error::{CourierError, CourierResult};
use crate::domain::lifecycle::{ConnectionState, MessageKind};
use crate::ports::inbound::{Handler, SubscribeOptions, Validator};
use crate::ports::outbound::MessageLogger;
use crate::service::correlation::{spawn_inbox_reader, PendingCall, PendingCalls};
use crate::service::dispatch::{Reader, Role, Route};
use crate::service::hooks::{Hooks, ResolvedHooks};
use crate::service::transport_events::spawn_event_watcher;

/// State shared by a connection's handle, its reader tasks and its calls.
pub(crate) struct Shared {
    pub config: ConnectionConfig,
    pub transport: Arc<dyn Transport>,
    pub counter: Arc<HandlingCounter>,
    pub pending: Arc<PendingCalls>,
    /// Reply subjects are `<inbox>.<token>`.
    pub inbox: String,
    pub inbox_subscription: SubscriptionId,
    pub state: watch::Sender<ConnectionState>,
    /// Handler subscriptions, removed on close.
    pub readers: Mutex<Vec<Reader>>,
    /// Tells reader tasks to stop pulling messages.
    pub stop: watch::Sender<bool>,
    pub message_logger: Arc<dyn MessageLogger>,
    pub error_logger: Arc<dyn MessageLogger>,
    pub hooks: ResolvedHooks,
    /// Inbox reader and transport event watcher.
    pub background: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn ensure_open(&self) -> CourierResult<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            state => Err(CourierError::NotOpen(state)),
        }
    }

    /// A fresh reply subject under this connection's inbox.
    pub(crate) fn reply_subject(&self) -> String {
        format!("{}.{}", self.inbox, inbox_token())
    }

    /// Publish an encoded envelope, then count and log it.
    pub(crate) async fn publish(
        &self,
        topic: &str,
        reply: Option<&str>,
        encoded: Encoded,
        kind: MessageKind,
    ) -> CourierResult<()> {
        self.transport.publish(topic, reply, encoded.bytes).await?;

        metrics::record_sent(kind.as_str());
        self.message_logger.info(
            "message sent",
            json!({ "type": kind.as_str(), "topic": topic, "message": encoded.envelope }),
        );
        Ok(())
    }
}

/// Builder for a [`Connection`] with a custom logger or hooks.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    logger: Arc<dyn MessageLogger>,
    hooks: Hooks,
}

impl ConnectionBuilder {
    /// Logger for transport events, message traffic and handler failures.
    /// Each category is routed here only while its toggle is on.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn MessageLogger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validate the configuration, connect, and open the reply inbox.
    pub async fn connect(self, connector: &dyn Connector) -> CourierResult<Connection> {
        let Self {
            config,
            logger,
            hooks,
        } = self;

        config.validate()?;
        let options = config.connect_options()?;
        if let Err(err) = courier_telemetry::register_metrics() {
            warn!(error = %err, "Metrics registration failed");
        }
        let transport = connector.connect(&options).await?;

        let noop: Arc<dyn MessageLogger> = Arc::new(NoopLogger);
        let pick = |enabled: bool| {
            if enabled {
                Arc::clone(&logger)
            } else {
                Arc::clone(&noop)
            }
        };
        let transport_logger = pick(config.log_transport_events);
        let message_logger = pick(config.log_message_events);
        let error_logger = pick(config.log_message_errors);
        let hooks = hooks.resolve(&logger, &error_logger);

        let events = transport.events();
        transport_logger.info(
            "transport connected",
            json!({ "servers": options.servers.urls() }),
        );

        let inbox = transport.new_inbox(&config.inbox_prefix);
        let inbox_subscription = transport.subscribe(&format!("{inbox}.*"), None).await?;
        let inbox_id = inbox_subscription.id();

        let pending = Arc::new(PendingCalls::new());
        let background = vec![
            spawn_inbox_reader(
                inbox_subscription,
                Arc::clone(&pending),
                Arc::clone(&message_logger),
            ),
            spawn_event_watcher(events, transport_logger, Arc::clone(&hooks.transport_error)),
        ];

        let (state, _) = watch::channel(ConnectionState::Open);
        let (stop, _) = watch::channel(false);

        info!(inbox = %inbox, group = ?config.group, "Connection open");

        Ok(Connection {
            shared: Arc::new(Shared {
                config,
                transport,
                counter: Arc::new(HandlingCounter::new()),
                pending,
                inbox,
                inbox_subscription: inbox_id,
                state,
                readers: Mutex::new(Vec::new()),
                stop,
                message_logger,
                error_logger,
                hooks,
                background: Mutex::new(background),
            }),
        })
    }
}

/// A messaging connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    pub(crate) shared: Arc<Shared>,
}

impl Connection {
    /// Start building a connection with a custom logger or hooks.
    #[must_use]
    pub fn builder(config: ConnectionConfig) -> ConnectionBuilder {
        ConnectionBuilder {
            config,
            logger: Arc::new(TracingLogger),
            hooks: Hooks::default(),
        }
    }

    /// Connect with the default logger and hooks.
    pub async fn connect(config: ConnectionConfig, connector: &dyn Connector) -> CourierResult<Self> {
        Self::builder(config).connect(connector).await
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Observe lifecycle transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Handlers and calls currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.counter.count()
    }

    /// Watch the in-flight count.
    #[must_use]
    pub fn in_flight_changes(&self) -> watch::Receiver<usize> {
        self.shared.counter.watch()
    }

    /// Calls waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.pending_count()
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Publish an envelope on `topic` without expecting a reply.
    ///
    /// Returns the envelope id. Never surfaces remote errors.
    pub async fn emit<D>(&self, topic: &str, data: &D, options: EmitOptions) -> CourierResult<String>
    where
        D: Serialize + ?Sized,
    {
        self.shared.ensure_open()?;
        let encoded = encode(data, options.error, options.from_id.as_deref())?;
        let id = encoded.id.clone();
        self.shared
            .publish(topic, None, encoded, MessageKind::Event)
            .await?;
        Ok(id)
    }

    /// Emit an event with default options.
    pub async fn emit_event<D>(&self, name: &str, data: &D) -> CourierResult<String>
    where
        D: Serialize + ?Sized,
    {
        self.emit(name, data, EmitOptions::default()).await
    }

    // =========================================================================
    // CALLS
    // =========================================================================

    /// Send a request on `topic` and wait for the reply.
    ///
    /// The request id is available on the returned [`PendingCall`] before it
    /// resolves. Resolves according to [`CallOptions::reply`]:
    ///
    /// - [`ReplyMode::Data`]: the reply payload, or the reply's error
    /// - [`ReplyMode::Envelope`]: the whole reply envelope as JSON
    /// - [`ReplyMode::EnvelopeOrError`]: the whole envelope, or the reply's error
    ///
    /// With no reply before the deadline the call fails with `TIMEOUT`.
    pub fn call<D>(&self, topic: &str, data: &D, options: CallOptions) -> CourierResult<PendingCall<Value>>
    where
        D: Serialize + ?Sized,
    {
        self.issue(topic, data, options, reply_value)
    }

    /// Like [`call`](Self::call) but resolves to the typed reply envelope.
    ///
    /// Error replies fail the call unless the mode is [`ReplyMode::Envelope`].
    pub fn call_envelope<D>(
        &self,
        topic: &str,
        data: &D,
        options: CallOptions,
    ) -> CourierResult<PendingCall<Envelope>>
    where
        D: Serialize + ?Sized,
    {
        self.issue(topic, data, options, reply_envelope)
    }

    /// Call a method with default options.
    pub fn call_method<D>(&self, name: &str, data: &D) -> CourierResult<PendingCall<Value>>
    where
        D: Serialize + ?Sized,
    {
        self.call(name, data, CallOptions::default())
    }

    /// Send a request envelope without a reply subject. The handler runs but
    /// nothing is sent back. Returns the request id.
    pub async fn call_method_and_forget<D>(&self, name: &str, data: &D) -> CourierResult<String>
    where
        D: Serialize + ?Sized,
    {
        self.shared.ensure_open()?;
        let encoded = encode(data, None, None)?;
        let id = encoded.id.clone();
        self.shared
            .publish(name, None, encoded, MessageKind::Request)
            .await?;
        Ok(id)
    }

    fn issue<D, T>(
        &self,
        topic: &str,
        data: &D,
        options: CallOptions,
        finish: fn(Envelope, ReplyMode) -> CourierResult<T>,
    ) -> CourierResult<PendingCall<T>>
    where
        D: Serialize + ?Sized,
        T: Send + 'static,
    {
        self.shared.ensure_open()?;

        let data = serde_json::to_value(data)?;
        let encoded = encode(&data, None, options.from_id.as_deref())?;
        let request_id = encoded.id.clone();
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.shared.config.default_call_timeout());
        let mode = options.reply;

        let reply_subject = self.shared.reply_subject();
        let replies = self.shared.pending.register(&reply_subject);
        let guard = self.shared.counter.enter();

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let topic = topic.to_string();

        tokio::spawn(async move {
            let outcome = shared
                .round_trip(&topic, &reply_subject, encoded, &data, timeout, replies)
                .await
                .and_then(|envelope| finish(envelope, mode));
            // The caller may have dropped the PendingCall; the outcome is moot then.
            let _ = tx.send(outcome);
            drop(guard);
        });

        Ok(PendingCall::new(request_id, rx))
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Subscribe `handler` to `topic` (wildcards allowed).
    ///
    /// `options.group` is used as given: `None` means every connection
    /// subscribed to the topic receives every message.
    pub async fn on<F, Fut, R, E>(&self, topic: &str, handler: F, options: SubscribeOptions) -> CourierResult<()>
    where
        F: Fn(Value, Envelope, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<RpcError> + Send + 'static,
    {
        self.on_handler(topic, Arc::new(handler), options).await
    }

    /// [`on`](Self::on) for a shared handler object.
    pub async fn on_handler(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: SubscribeOptions,
    ) -> CourierResult<()> {
        let SubscribeOptions { validator, group } = options;
        self.shared
            .subscribe_route(route(topic, Role::Topic, validator, handler), group)
            .await
    }

    /// Register a method. Connections sharing the configured group compete
    /// for each call.
    pub async fn register_method<F, Fut, R, E>(
        &self,
        name: &str,
        handler: F,
        options: SubscribeOptions,
    ) -> CourierResult<()>
    where
        F: Fn(Value, Envelope, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<RpcError> + Send + 'static,
    {
        let SubscribeOptions { validator, group } = options;
        let group = group.or_else(|| self.shared.config.group.clone());
        self.shared
            .subscribe_route(route(name, Role::Method, validator, Arc::new(handler)), group)
            .await
    }

    /// Listen for an event. Connections sharing the configured group compete
    /// for each event.
    pub async fn listen<F, Fut, R, E>(&self, name: &str, handler: F, options: SubscribeOptions) -> CourierResult<()>
    where
        F: Fn(Value, Envelope, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<RpcError> + Send + 'static,
    {
        let SubscribeOptions { validator, group } = options;
        let group = group.or_else(|| self.shared.config.group.clone());
        self.shared
            .subscribe_route(route(name, Role::Event, validator, Arc::new(handler)), group)
            .await
    }

    /// Listen for an event on every connection, ignoring groups.
    pub async fn listen_broadcast<F, Fut, R, E>(
        &self,
        name: &str,
        handler: F,
        options: SubscribeOptions,
    ) -> CourierResult<()>
    where
        F: Fn(Value, Envelope, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<RpcError> + Send + 'static,
    {
        self.shared
            .subscribe_route(route(name, Role::Event, options.validator, Arc::new(handler)), None)
            .await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("inbox", &self.shared.inbox)
            .field("group", &self.shared.config.group)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn route(
    topic: &str,
    role: Role,
    validator: Option<Arc<dyn Validator>>,
    handler: Arc<dyn Handler>,
) -> Route {
    Route {
        topic: topic.to_string(),
        role,
        validator,
        handler,
    }
}

fn reply_value(mut envelope: Envelope, mode: ReplyMode) -> CourierResult<Value> {
    match mode {
        ReplyMode::Data => Ok(envelope.into_result()?),
        ReplyMode::Envelope => Ok(serde_json::to_value(envelope)?),
        ReplyMode::EnvelopeOrError => match envelope.error.take() {
            Some(error) => Err(error.into()),
            None => Ok(serde_json::to_value(envelope)?),
        },
    }
}

fn reply_envelope(mut envelope: Envelope, mode: ReplyMode) -> CourierResult<Envelope> {
    match mode {
        ReplyMode::Envelope => Ok(envelope),
        ReplyMode::Data | ReplyMode::EnvelopeOrError => match envelope.error.take() {
            Some(error) => Err(error.into()),
            None => Ok(envelope),
        },
    }
}
