//! # Malformed Traffic Scenarios
//!
//! Raw bytes published straight onto the broker, bypassing the envelope
//! codec. Undecodable or foreign-version messages are logged and dropped
//! without reaching a handler; undecodable replies fail the waiting call.

#[cfg(test)]
mod tests {
    use super::super::{close_all, node, WAIT};
    use courier::{
        codes, CallOptions, Connection, ConnectionConfig, Hooks, InMemoryBroker, LogLevel,
        MemoryLogger, RpcError, SubscribeOptions, Transport,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_undecodable_messages_never_reach_handler() {
        let broker = InMemoryBroker::new();
        let memory = Arc::new(MemoryLogger::new());
        let listener = Connection::builder(ConnectionConfig::with_group("audit"))
            .logger(memory.clone())
            .hooks(Hooks::silent())
            .connect(&broker)
            .await
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        {
            let hits = Arc::clone(&hits);
            listener
                .listen(
                    "audit.entry",
                    move |_, _, _| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<_, RpcError>(()) }
                    },
                    SubscribeOptions::new(),
                )
                .await
                .unwrap();
        }

        let raw = broker.connection();
        raw.publish("audit.entry", None, b"garbage".to_vec())
            .await
            .unwrap();
        let foreign = json!({ "v": 2, "id": "x", "ts": 0, "data": 1 });
        raw.publish("audit.entry", None, serde_json::to_vec(&foreign).unwrap())
            .await
            .unwrap();

        timeout(WAIT, async {
            while memory.find(LogLevel::Error, "message dropped").len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(listener.in_flight(), 0);

        // The subscription is still serving well-formed traffic.
        let emitter = node(&broker, "emitters").await;
        emitter.emit_event("audit.entry", &1).await.unwrap();
        timeout(WAIT, async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        close_all(&[&emitter, &listener]).await;
    }

    #[tokio::test]
    async fn test_garbage_reply_fails_call_with_protocol_error() {
        let broker = InMemoryBroker::new();
        let client = node(&broker, "client").await;

        let raw = broker.connection();
        let mut requests = raw.subscribe("lookup", Some("raw")).await.unwrap();
        let responder = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            let reply = request.reply.unwrap();
            raw.publish(&reply, None, b"not an envelope".to_vec())
                .await
                .unwrap();
        });

        let err = client
            .call("lookup", &json!({ "key": 1 }), CallOptions::new().timeout(WAIT))
            .unwrap()
            .await
            .unwrap_err();
        let rpc = err.rpc().unwrap();
        assert_eq!(rpc.code, codes::PROTOCOL_ERROR);
        assert_eq!(client.pending_calls(), 0);

        responder.await.unwrap();
        close_all(&[&client]).await;
    }
}
