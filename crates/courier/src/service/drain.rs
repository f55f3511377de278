//! Graceful shutdown.
//!
//! `close()` moves the connection Open → Draining → Closed:
//!
//! 1. Handler subscriptions are removed and their readers stopped, so no new
//!    work is accepted. Calls and emits now fail with `NotOpen`.
//! 2. Wait until every handler and outbound call still in flight finishes.
//!    Handlers already running still publish their replies.
//! 3. Flush, drop the reply inbox and close the transport.
//!
//! Concurrent and repeated `close()` calls all resolve when the connection
//! reaches Closed; only the first one drives the sequence.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::error::CourierResult;
use crate::domain::lifecycle::ConnectionState;
use crate::service::connection::{Connection, Shared};

impl Connection {
    /// Stop accepting work, wait for in-flight work, then close the
    /// transport.
    pub async fn close(&self) -> CourierResult<()> {
        let first = self.shared.state.send_if_modified(|state| {
            if state.is_open() {
                *state = ConnectionState::Draining;
                true
            } else {
                false
            }
        });

        if !first {
            let mut changes = self.shared.state.subscribe();
            // The sender lives in `shared`, so the channel outlives the wait.
            let _ = changes
                .wait_for(|state| *state == ConnectionState::Closed)
                .await;
            return Ok(());
        }

        info!(in_flight = self.in_flight(), "Connection draining");
        let result = Arc::clone(&self.shared).drain().await;
        self.shared.state.send_replace(ConnectionState::Closed);
        info!("Connection closed");
        result
    }
}

impl Shared {
    async fn drain(self: Arc<Self>) -> CourierResult<()> {
        let readers = std::mem::take(&mut *self.readers.lock());
        for reader in &readers {
            if let Err(err) = self.transport.unsubscribe(reader.id).await {
                warn!(topic = %reader.topic, error = %err, "Failed to unsubscribe handler");
            }
        }
        self.stop.send_replace(true);
        for reader in readers {
            if let Err(err) = reader.handle.await {
                warn!(topic = %reader.topic, error = %err, "Subscription reader failed");
            }
        }
        debug!("Handler subscriptions removed");

        self.counter.request_close();
        self.counter.drained().await;
        debug!("In-flight work drained");

        // Let reply tasks that just released their guard finish publishing.
        tokio::task::yield_now().await;

        self.transport.flush().await?;
        if let Err(err) = self.transport.unsubscribe(self.inbox_subscription).await {
            warn!(error = %err, "Failed to unsubscribe reply inbox");
        }
        self.transport.close().await?;

        let background = std::mem::take(&mut *self.background.lock());
        for task in background {
            let _ = task.await;
        }
        Ok(())
    }
}
