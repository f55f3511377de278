//! # Shutdown Scenarios
//!
//! `close()` stops intake, waits for in-flight work and only then closes the
//! transport.
//!
//! ```text
//! [OPEN] ──close()──→ [DRAINING] ──in flight = 0──→ [CLOSED]
//! ```

#[cfg(test)]
mod tests {
    use super::super::{close_all, node, WAIT};
    use courier::{
        CallOptions, ConnectionState, CourierError, InMemoryBroker, RpcError, SubscribeOptions,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_drain_waits_for_slow_handler() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "slow").await;
        let client = node(&broker, "client").await;
        let finished = Arc::new(AtomicBool::new(false));

        {
            let finished = Arc::clone(&finished);
            server
                .register_method(
                    "slow",
                    move |_, _, _| {
                        let finished = Arc::clone(&finished);
                        async move {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            finished.store(true, Ordering::SeqCst);
                            Ok::<_, RpcError>("finished")
                        }
                    },
                    SubscribeOptions::new(),
                )
                .await
                .unwrap();
        }

        let call = client.call_method("slow", &()).unwrap();
        let mut in_flight = server.in_flight_changes();
        timeout(WAIT, in_flight.wait_for(|count| *count > 0))
            .await
            .unwrap()
            .unwrap();

        let started = Instant::now();
        server.close().await.unwrap();

        assert!(finished.load(Ordering::SeqCst), "close returned before the handler");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(server.state(), ConnectionState::Closed);

        // The reply was published before the transport closed.
        assert_eq!(timeout(WAIT, call).await.unwrap().unwrap(), json!("finished"));
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_waits_for_outbound_call() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "slow").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "slow",
                |_, _, _| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, RpcError>(1)
                },
                SubscribeOptions::new(),
            )
            .await
            .unwrap();

        let call = client.call_method("slow", &()).unwrap();
        assert_eq!(client.in_flight(), 1);

        // The client's own call holds its drain open.
        client.close().await.unwrap();
        assert_eq!(call.await.unwrap(), json!(1));

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_draining_state_rejects_new_work() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "slow").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "slow",
                |_, _, _| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, RpcError>(())
                },
                SubscribeOptions::new(),
            )
            .await
            .unwrap();

        let call = client.call_method("slow", &()).unwrap();
        let mut in_flight = server.in_flight_changes();
        timeout(WAIT, in_flight.wait_for(|count| *count > 0))
            .await
            .unwrap()
            .unwrap();

        let closing = {
            let server = server.clone();
            tokio::spawn(async move { server.close().await })
        };
        let mut states = server.state_changes();
        timeout(WAIT, states.wait_for(|state| *state == ConnectionState::Draining))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            server.emit_event("late", &()).await,
            Err(CourierError::NotOpen(ConnectionState::Draining))
        ));
        let late = server
            .register_method(
                "late",
                |_, _, _| async { Ok::<_, RpcError>(()) },
                SubscribeOptions::new(),
            )
            .await;
        assert!(matches!(late, Err(CourierError::NotOpen(_))));

        closing.await.unwrap().unwrap();
        call.await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_server_stops_receiving() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "gone").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "ping",
                |_, _, _| async { Ok::<_, RpcError>("pong") },
                SubscribeOptions::new(),
            )
            .await
            .unwrap();
        server.close().await.unwrap();
        assert_eq!(broker.subscriber_count_for("ping"), 0);

        let err = client
            .call("ping", &(), CallOptions::new().timeout(Duration::from_millis(20)))
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        close_all(&[&client]).await;
    }
}
