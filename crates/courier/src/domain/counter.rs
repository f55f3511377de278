//! Handling counter.
//!
//! Counts handlers and outbound calls currently executing on one connection.
//! The drain signal fires once, and only when close has been requested and
//! the count is zero; a zero crossing while the connection is open means
//! nothing.

use courier_telemetry::metrics::IN_FLIGHT;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

pub struct HandlingCounter {
    count: AtomicUsize,
    close_requested: AtomicBool,
    drained: watch::Sender<bool>,
    changes: watch::Sender<usize>,
}

impl HandlingCounter {
    #[must_use]
    pub fn new() -> Self {
        let (drained, _) = watch::channel(false);
        let (changes, _) = watch::channel(0);
        Self {
            count: AtomicUsize::new(0),
            close_requested: AtomicBool::new(false),
            drained,
            changes,
        }
    }

    /// Count one unit of work until the returned guard is dropped.
    #[must_use = "the work is only counted while the guard is alive"]
    pub fn enter(self: &Arc<Self>) -> HandlingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        IN_FLIGHT.inc();
        self.publish_count();
        HandlingGuard {
            counter: Arc::clone(self),
        }
    }

    fn leave(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        IN_FLIGHT.dec();
        self.publish_count();
        self.check_drained();
    }

    // The load happens under the watch lock, so the last writer always
    // publishes the current count.
    fn publish_count(&self) {
        self.changes
            .send_modify(|current| *current = self.count.load(Ordering::SeqCst));
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Watch the count. The receiver sees the latest value on every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.changes.subscribe()
    }

    /// Arm the drain signal. Fires immediately if nothing is in flight.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        self.check_drained();
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        *self.drained.borrow()
    }

    /// Resolves once close was requested and the count reached zero.
    pub async fn drained(&self) {
        let mut receiver = self.drained.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|drained| *drained).await;
    }

    fn check_drained(&self) {
        if self.close_requested.load(Ordering::SeqCst) && self.count.load(Ordering::SeqCst) == 0 {
            self.drained.send_if_modified(|drained| {
                let fired = !*drained;
                *drained = true;
                fired
            });
        }
    }
}

impl Default for HandlingCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the counter on drop.
pub struct HandlingGuard {
    counter: Arc<HandlingCounter>,
}

impl Drop for HandlingGuard {
    fn drop(&mut self) {
        self.counter.leave();
    }
}
