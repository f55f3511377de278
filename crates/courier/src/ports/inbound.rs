//! Inbound ports: what user code plugs into a subscription.

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use shared_types::{Envelope, RpcError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a [`Handler`].
pub type HandlerFuture = BoxFuture<'static, Result<Value, RpcError>>;

/// Handles messages on a subscription.
///
/// Receives the (validated) payload, the decoded envelope and the concrete
/// subject the message arrived on. The returned value becomes the reply
/// payload when the sender expects one.
///
/// Any `Fn(Value, Envelope, String) -> impl Future<Output = Result<R, E>>`
/// is a handler when `R: Serialize` and `E: Into<RpcError>`, so closures
/// returning `anyhow::Result` work directly.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, data: Value, envelope: Envelope, topic: String) -> HandlerFuture;
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Value, Envelope, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<RpcError> + Send + 'static,
{
    fn handle(&self, data: Value, envelope: Envelope, topic: String) -> HandlerFuture {
        let future = (self)(data, envelope, topic);
        Box::pin(async move {
            let result = future.await.map_err(Into::into)?;
            serde_json::to_value(result).map_err(RpcError::from)
        })
    }
}

/// Inspects and possibly transforms a payload before the handler runs.
///
/// Rejects with a typed error, conventionally `VALIDATION_ERROR` with
/// field-level details.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, data: Value) -> Result<Value, RpcError>;
}

impl<F> Validator for F
where
    F: Fn(Value) -> Result<Value, RpcError> + Send + Sync + 'static,
{
    fn validate(&self, data: Value) -> Result<Value, RpcError> {
        (self)(data)
    }
}

/// Options for a subscription.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Runs before the handler.
    pub validator: Option<Arc<dyn Validator>>,
    /// Queue group. Where the connection supplies a default group, `None`
    /// falls back to it; `on` takes it literally.
    pub group: Option<String>,
}

impl SubscribeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn validator<V: Validator>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("validator", &self.validator.is_some())
            .field("group", &self.group)
            .finish()
    }
}
