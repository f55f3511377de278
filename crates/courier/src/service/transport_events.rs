//! Transport event watcher.

use crate::ports::outbound::MessageLogger;
use crate::service::hooks::TransportErrorHook;
use serde_json::{json, Value};
use shared_bus::TransportEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Log connection events and hand faults to the transport error hook.
///
/// Ends when the transport closes.
pub(crate) fn spawn_event_watcher(
    mut events: broadcast::Receiver<TransportEvent>,
    logger: Arc<dyn MessageLogger>,
    on_error: TransportErrorHook,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    log_event(logger.as_ref(), &event);
                    match event {
                        TransportEvent::Error(reason) => on_error(&reason),
                        TransportEvent::Closed => break,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transport events lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Transport event watcher stopped");
    })
}

fn log_event(logger: &dyn MessageLogger, event: &TransportEvent) {
    match event {
        TransportEvent::Connected => logger.info("transport connected", Value::Null),
        TransportEvent::Disconnected => logger.warn("transport disconnected", Value::Null),
        TransportEvent::Reconnecting => logger.info("transport reconnecting", Value::Null),
        TransportEvent::Reconnected => logger.info("transport reconnected", Value::Null),
        TransportEvent::Closed => logger.info("transport connection closed", Value::Null),
        TransportEvent::Error(reason) => logger.error("transport error", json!({ "error": reason })),
    }
}
