//! Dispatch layer.
//!
//! One reader task per subscription pulls messages in delivery order. For
//! each message it counts the work, decodes, validates and invokes the
//! handler, then spawns the rest (awaiting the handler, replying) so that
//! handlers for different messages can interleave.
//!
//! ```text
//! recv ─→ enter counter ─→ decode ─✗─→ log, drop
//!                            │
//!                            ▼
//!                        validate ─✗──────────────┐
//!                            │                    │
//!                            ▼                    ▼
//!                     invoke handler ──→ await ──→ reply (if reply subject)
//!                                                  │
//!                                          guard dropped
//! ```

use courier_telemetry::metrics;
use futures::FutureExt;
use serde_json::{json, Value};
use shared_bus::{Subscription, SubscriptionId, TransportMessage};
use shared_types::{decode, encode_envelope, Envelope, RpcError};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::error::{CourierError, CourierResult};
use crate::domain::lifecycle::MessageKind;
use crate::ports::inbound::{Handler, HandlerFuture, Validator};
use crate::service::connection::Shared;
use crate::service::hooks::HandlerFailure;

/// Which failure hook a subscription reports to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Method,
    Event,
    /// Decided per message: requests are methods, the rest events.
    Topic,
}

pub(crate) struct Route {
    pub topic: String,
    pub role: Role,
    pub validator: Option<Arc<dyn Validator>>,
    pub handler: Arc<dyn Handler>,
}

/// A live handler subscription.
pub(crate) struct Reader {
    pub id: SubscriptionId,
    pub topic: String,
    pub handle: JoinHandle<()>,
}

impl Shared {
    /// Subscribe `route` and start its reader.
    pub(crate) async fn subscribe_route(
        self: &Arc<Self>,
        route: Route,
        group: Option<String>,
    ) -> CourierResult<()> {
        self.ensure_open()?;

        let subscription = self
            .transport
            .subscribe(&route.topic, group.as_deref())
            .await?;
        let id = subscription.id();
        let topic = route.topic.clone();

        // Registration and close() race on the reader list; whoever takes the
        // lock second sees the other's effect.
        let rejected = {
            let mut readers = self.readers.lock();
            match self.state() {
                state if !state.is_open() => Some(state),
                _ => {
                    readers.push(Reader {
                        id,
                        topic: topic.clone(),
                        handle: spawn_reader(Arc::clone(self), route, subscription),
                    });
                    None
                }
            }
        };

        if let Some(state) = rejected {
            if let Err(err) = self.transport.unsubscribe(id).await {
                warn!(topic = %topic, sid = %id, error = %err, "Failed to unsubscribe rejected handler");
            }
            return Err(CourierError::NotOpen(state));
        }

        debug!(topic = %topic, group = ?group, sid = %id, "Handler subscribed");
        Ok(())
    }

    fn report_failure(&self, role: Role, kind: MessageKind, topic: &str, envelope: &Envelope, error: &RpcError) {
        metrics::record_handler_error(error.code);

        if error.is_validation() {
            self.error_logger.warn(
                "message rejected",
                json!({ "topic": topic, "id": envelope.id, "error": error }),
            );
            return;
        }

        let failure = HandlerFailure {
            topic: topic.to_string(),
            message_id: envelope.id.clone(),
            error: error.clone(),
        };
        let is_method = match role {
            Role::Method => true,
            Role::Event => false,
            Role::Topic => kind == MessageKind::Request,
        };
        if is_method {
            (self.hooks.method_error)(&failure);
        } else {
            (self.hooks.event_error)(&failure);
        }
    }

    async fn send_reply(&self, reply: &str, request: &Envelope, outcome: Result<Value, RpcError>) {
        let sent = match encode_envelope(Envelope::reply(request, outcome)) {
            Ok(encoded) => self.publish(reply, None, encoded, MessageKind::Response).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = sent {
            self.error_logger.error(
                "failed to send reply",
                json!({ "topic": reply, "request_id": request.id, "error": err.to_string() }),
            );
        }
    }
}

fn spawn_reader(shared: Arc<Shared>, route: Route, mut subscription: Subscription) -> JoinHandle<()> {
    let mut stop = shared.stop.subscribe();
    let route = Arc::new(route);

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let guard = shared.counter.enter();
            if let Some(work) = accept(&shared, &route, message) {
                tokio::spawn(async move {
                    work.await;
                    drop(guard);
                });
            }
        }
        trace!(topic = %route.topic, "Subscription reader stopped");
    })
}

/// Decode, validate and invoke. Returns the remaining work, or `None` when
/// the message was dropped.
fn accept(
    shared: &Arc<Shared>,
    route: &Arc<Route>,
    message: TransportMessage,
) -> Option<impl Future<Output = ()> + Send + 'static> {
    let TransportMessage {
        subject: topic,
        reply,
        payload,
    } = message;
    let kind = MessageKind::inbound(reply.as_deref());

    let envelope = match decode(&payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            metrics::PROTOCOL_ERRORS.inc();
            shared
                .error_logger
                .error("message dropped", json!({ "topic": topic, "error": err }));
            return None;
        }
    };

    metrics::record_received(kind.as_str());
    shared.message_logger.info(
        "message received",
        json!({ "type": kind.as_str(), "topic": topic, "message": envelope }),
    );

    let data = match &route.validator {
        Some(validator) => validate(validator.as_ref(), envelope.data.clone()),
        None => Ok(envelope.data.clone()),
    };
    let invocation = data.map(|data| invoke(route.handler.as_ref(), data, envelope.clone(), topic.clone()));

    let shared = Arc::clone(shared);
    let route = Arc::clone(route);
    Some(async move {
        let outcome = match invocation {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(RpcError::internal(panic_message(panic.as_ref())))),
            Err(rejection) => Err(rejection),
        };

        if let Err(err) = &outcome {
            shared.report_failure(route.role, kind, &topic, &envelope, err);
        }
        if let Some(reply) = reply {
            shared.send_reply(&reply, &envelope, outcome).await;
        }
    })
}

/// Run the validator, turning a panic into an internal error.
fn validate(validator: &dyn Validator, data: Value) -> Result<Value, RpcError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| validator.validate(data)))
        .unwrap_or_else(|panic| Err(RpcError::internal(panic_message(panic.as_ref()))))
}

/// Call the handler, turning a panic during the call into an internal error.
fn invoke(handler: &dyn Handler, data: Value, envelope: Envelope, topic: String) -> HandlerFuture {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(data, envelope, topic))) {
        Ok(future) => future,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            Box::pin(async move { Err(RpcError::internal(message)) })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
