//! Failure policies.
//!
//! Applications override what happens on a transport fault and on handler
//! failures. Unset hooks fall back to logging; the transport fault default
//! also terminates the process, since a connection that reported a fault can
//! no longer be trusted.

use crate::ports::outbound::MessageLogger;
use serde_json::json;
use shared_types::RpcError;
use std::fmt;
use std::sync::Arc;

/// Called with the reason of a transport fault.
pub type TransportErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called when a handler fails.
pub type HandlerErrorHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// A failed handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    /// Concrete subject the message arrived on.
    pub topic: String,
    /// Id of the envelope being handled.
    pub message_id: String,
    pub error: RpcError,
}

/// Overridable failure policies.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_transport_error: Option<TransportErrorHook>,
    pub on_method_error: Option<HandlerErrorHook>,
    pub on_event_error: Option<HandlerErrorHook>,
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transport_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_transport_error = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn method_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.on_method_error = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn event_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.on_event_error = Some(Arc::new(hook));
        self
    }

    /// Hooks that ignore every failure. Handler failures are still replied
    /// to callers.
    #[must_use]
    pub fn silent() -> Self {
        Self::new()
            .transport_error(|_| {})
            .method_error(|_| {})
            .event_error(|_| {})
    }

    /// Fill unset hooks with the defaults.
    pub(crate) fn resolve(
        self,
        logger: &Arc<dyn MessageLogger>,
        error_logger: &Arc<dyn MessageLogger>,
    ) -> ResolvedHooks {
        ResolvedHooks {
            transport_error: self
                .on_transport_error
                .unwrap_or_else(|| exit_on_transport_error(Arc::clone(logger))),
            method_error: self
                .on_method_error
                .unwrap_or_else(|| log_failure(Arc::clone(error_logger), "method handler failed")),
            event_error: self
                .on_event_error
                .unwrap_or_else(|| log_failure(Arc::clone(error_logger), "event handler failed")),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_transport_error", &self.on_transport_error.is_some())
            .field("on_method_error", &self.on_method_error.is_some())
            .field("on_event_error", &self.on_event_error.is_some())
            .finish()
    }
}

pub(crate) struct ResolvedHooks {
    pub transport_error: TransportErrorHook,
    pub method_error: HandlerErrorHook,
    pub event_error: HandlerErrorHook,
}

fn exit_on_transport_error(logger: Arc<dyn MessageLogger>) -> TransportErrorHook {
    Arc::new(move |reason: &str| {
        logger.error("transport error, exiting", json!({ "error": reason }));
        std::process::exit(1);
    })
}

fn log_failure(logger: Arc<dyn MessageLogger>, message: &'static str) -> HandlerErrorHook {
    Arc::new(move |failure: &HandlerFailure| {
        logger.error(
            message,
            json!({
                "topic": failure.topic,
                "id": failure.message_id,
                "error": failure.error,
            }),
        );
    })
}
