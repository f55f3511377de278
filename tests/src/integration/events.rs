//! # Event Scenarios
//!
//! Events are fire and forget. Grouped listeners share each event; broadcast
//! listeners all receive it.
//!
//! ## Flows Tested:
//!
//! 1. **Emit → listen**: id, payload and `fromId` arrive intact
//! 2. **Grouped listeners**: exactly one member handles each event
//! 3. **Broadcast listeners**: every connection handles each event
//! 4. **Wildcards**: the handler sees the concrete subject
//! 5. **Event failures**: go to the event hook, never back to the emitter
//! 6. **Message logging**: sent and received envelopes reach the logger

#[cfg(test)]
mod tests {
    use super::super::{close_all, node, WAIT};
    use courier::{
        Connection, ConnectionConfig, EmitOptions, Envelope, Hooks, InMemoryBroker, LogLevel,
        MemoryLogger, RpcError, SubscribeOptions,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    type Seen = mpsc::UnboundedSender<(String, Envelope, String)>;

    type Ready = std::future::Ready<Result<(), RpcError>>;

    /// A handler that forwards everything it receives.
    fn recorder(
        label: &'static str,
        tx: Seen,
    ) -> impl Fn(Value, Envelope, String) -> Ready + Send + Sync + 'static {
        move |_, envelope, topic| {
            let _ = tx.send((label.to_string(), envelope, topic));
            std::future::ready(Ok(()))
        }
    }

    /// Drain whatever arrives within `window`.
    async fn collect<T>(rx: &mut mpsc::UnboundedReceiver<T>, window: Duration) -> Vec<T> {
        let mut seen = Vec::new();
        while let Ok(Some(item)) = timeout(window, rx.recv()).await {
            seen.push(item);
        }
        seen
    }

    // =========================================================================
    // EMIT → LISTEN
    // =========================================================================

    #[tokio::test]
    async fn test_emit_delivers_event_id() {
        let broker = InMemoryBroker::new();
        let listener = node(&broker, "listeners").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        listener
            .listen("user.created", recorder("a", tx), SubscribeOptions::new())
            .await
            .unwrap();

        let id = emitter
            .emit_event("user.created", &json!({ "name": "Alice" }))
            .await
            .unwrap();

        let (_, envelope, topic) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.data, json!({ "name": "Alice" }));
        assert_eq!(topic, "user.created");

        close_all(&[&emitter, &listener]).await;
    }

    #[tokio::test]
    async fn test_from_id_propagates_on_emit() {
        let broker = InMemoryBroker::new();
        let listener = node(&broker, "listeners").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        listener
            .listen("job.done", recorder("a", tx), SubscribeOptions::new())
            .await
            .unwrap();

        emitter
            .emit("job.done", &42, EmitOptions::new().from_id("req-1"))
            .await
            .unwrap();

        let (_, envelope, _) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.from_id.as_deref(), Some("req-1"));
        assert_eq!(envelope.data, json!(42));

        close_all(&[&emitter, &listener]).await;
    }

    #[tokio::test]
    async fn test_emit_with_error_envelope() {
        let broker = InMemoryBroker::new();
        let listener = node(&broker, "listeners").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        listener
            .listen("job.failed", recorder("a", tx), SubscribeOptions::new())
            .await
            .unwrap();

        emitter
            .emit(
                "job.failed",
                &(),
                EmitOptions::new().error(RpcError::internal("disk full")),
            )
            .await
            .unwrap();

        let (_, envelope, _) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.error.unwrap().message, "disk full");
        assert_eq!(envelope.data, Value::Null);

        close_all(&[&emitter, &listener]).await;
    }

    // =========================================================================
    // GROUPED VS BROADCAST
    // =========================================================================

    #[tokio::test]
    async fn test_grouped_listeners_receive_once() {
        let broker = InMemoryBroker::new();
        let a = node(&broker, "billing").await;
        let b = node(&broker, "billing").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        a.listen("order.paid", recorder("a", tx.clone()), SubscribeOptions::new())
            .await
            .unwrap();
        b.listen("order.paid", recorder("b", tx), SubscribeOptions::new())
            .await
            .unwrap();

        for n in 0..6 {
            emitter.emit_event("order.paid", &n).await.unwrap();
        }

        let seen = collect(&mut rx, Duration::from_millis(100)).await;
        assert_eq!(seen.len(), 6);
        let mut payloads: Vec<i64> = seen
            .iter()
            .map(|(_, envelope, _)| envelope.data.as_i64().unwrap())
            .collect();
        payloads.sort_unstable();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4, 5]);

        close_all(&[&emitter, &a, &b]).await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_listener() {
        let broker = InMemoryBroker::new();
        let a = node(&broker, "cache").await;
        let b = node(&broker, "cache").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        a.listen_broadcast("config.changed", recorder("a", tx.clone()), SubscribeOptions::new())
            .await
            .unwrap();
        b.listen_broadcast("config.changed", recorder("b", tx), SubscribeOptions::new())
            .await
            .unwrap();

        emitter
            .emit_event("config.changed", &json!({ "key": "ttl" }))
            .await
            .unwrap();

        let seen = collect(&mut rx, Duration::from_millis(100)).await;
        let mut labels: Vec<_> = seen.iter().map(|(label, _, _)| label.as_str()).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec!["a", "b"]);

        close_all(&[&emitter, &a, &b]).await;
    }

    #[tokio::test]
    async fn test_on_without_group_broadcasts() {
        let broker = InMemoryBroker::new();
        let a = node(&broker, "same").await;
        let b = node(&broker, "same").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        a.on("raw.topic", recorder("a", tx.clone()), SubscribeOptions::new())
            .await
            .unwrap();
        b.on("raw.topic", recorder("b", tx), SubscribeOptions::new())
            .await
            .unwrap();

        emitter.emit_event("raw.topic", &1).await.unwrap();
        assert_eq!(collect(&mut rx, Duration::from_millis(100)).await.len(), 2);

        close_all(&[&emitter, &a, &b]).await;
    }

    // =========================================================================
    // WILDCARDS
    // =========================================================================

    #[tokio::test]
    async fn test_wildcard_handler_sees_concrete_topic() {
        let broker = InMemoryBroker::new();
        let listener = node(&broker, "audit").await;
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        listener
            .listen("orders.*", recorder("single", tx.clone()), SubscribeOptions::new())
            .await
            .unwrap();
        listener
            .listen_broadcast("audit.>", recorder("tail", tx), SubscribeOptions::new())
            .await
            .unwrap();

        emitter.emit_event("orders.created", &1).await.unwrap();
        emitter.emit_event("orders.eu.created", &2).await.unwrap();
        emitter.emit_event("audit.login.failed", &3).await.unwrap();

        let seen = collect(&mut rx, Duration::from_millis(100)).await;
        let topics: Vec<_> = seen
            .iter()
            .map(|(label, _, topic)| format!("{label}:{topic}"))
            .collect();
        assert_eq!(topics.len(), 2);
        assert!(topics.contains(&"single:orders.created".to_string()));
        assert!(topics.contains(&"tail:audit.login.failed".to_string()));

        close_all(&[&emitter, &listener]).await;
    }

    // =========================================================================
    // FAILURES AND LOGGING
    // =========================================================================

    #[tokio::test]
    async fn test_event_failure_goes_to_event_hook() {
        let broker = InMemoryBroker::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let failures = Arc::clone(&failures);
            Connection::builder(ConnectionConfig::with_group("fragile"))
                .hooks(
                    Hooks::silent()
                        .event_error(move |failure| failures.lock().push(failure.clone()))
                        .method_error(|failure| panic!("not a method: {}", failure.topic)),
                )
                .connect(&broker)
                .await
                .unwrap()
        };
        let emitter = node(&broker, "emitters").await;

        listener
            .listen(
                "sensor.reading",
                |_, _, _| async { Err::<(), _>(RpcError::internal("bad sensor")) },
                SubscribeOptions::new(),
            )
            .await
            .unwrap();

        let id = emitter.emit_event("sensor.reading", &99).await.unwrap();

        let mut in_flight = listener.in_flight_changes();
        timeout(WAIT, async {
            while failures.lock().is_empty() {
                in_flight.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        let failures = failures.lock().clone();
        assert_eq!(failures[0].message_id, id);
        assert_eq!(failures[0].error.message, "bad sensor");

        close_all(&[&emitter, &listener]).await;
    }

    #[tokio::test]
    async fn test_message_events_are_logged() {
        let broker = InMemoryBroker::new();
        let memory = Arc::new(MemoryLogger::new());
        let listener = Connection::builder(ConnectionConfig::with_group("logged"))
            .logger(memory.clone())
            .hooks(Hooks::silent())
            .connect(&broker)
            .await
            .unwrap();
        let emitter = node(&broker, "emitters").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        listener
            .listen("ping", recorder("a", tx), SubscribeOptions::new())
            .await
            .unwrap();
        emitter.emit_event("ping", &1).await.unwrap();
        timeout(WAIT, rx.recv()).await.unwrap().unwrap();

        let received = memory.find(LogLevel::Info, "message received");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].fields["type"], json!("event"));
        assert_eq!(received[0].fields["topic"], json!("ping"));

        close_all(&[&emitter, &listener]).await;
    }

    #[tokio::test]
    async fn test_message_logging_toggle_off() {
        let broker = InMemoryBroker::new();
        let memory = Arc::new(MemoryLogger::new());
        let config = ConnectionConfig {
            log_message_events: false,
            ..ConnectionConfig::with_group("quiet")
        };
        let emitter = Connection::builder(config)
            .logger(memory.clone())
            .hooks(Hooks::silent())
            .connect(&broker)
            .await
            .unwrap();

        emitter.emit_event("nobody.listens", &1).await.unwrap();
        assert!(memory.find(LogLevel::Info, "message sent").is_empty());
        // Transport events still use the logger.
        assert_eq!(memory.find(LogLevel::Info, "transport connected").len(), 1);

        emitter.close().await.unwrap();
    }
}
