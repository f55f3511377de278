//! # Validation Scenarios
//!
//! Validators run before the handler. A rejection never reaches the handler
//! and, for calls, comes back to the caller with its code and details.

#[cfg(test)]
mod tests {
    use super::super::{close_all, node, WAIT};
    use courier::{
        codes, CallOptions, Connection, ConnectionConfig, Hooks, InMemoryBroker, LogLevel,
        MemoryLogger, ReplyMode, RpcError, SubscribeOptions, TypedValidator, INVALID_DATA,
    };
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn check_age(data: Value) -> Result<Value, RpcError> {
        match data.get("age").and_then(Value::as_u64) {
            Some(age) if age >= 18 => Ok(data),
            _ => Err(RpcError::validation(
                "age must be at least 18",
                json!({ "field": "age" }),
            )),
        }
    }

    #[tokio::test]
    async fn test_validator_can_rewrite_input() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "greeter").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "hello",
                |data: Value, _, _| async move {
                    Ok::<_, RpcError>(format!("hello {}", data["name"].as_str().unwrap_or("?")))
                },
                SubscribeOptions::new().validator(|mut data: Value| -> Result<Value, RpcError> {
                    data["name"] = json!("Bob");
                    Ok(data)
                }),
            )
            .await
            .unwrap();

        let reply = client
            .call_method("hello", &json!({ "name": "Mallory" }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reply, json!("hello Bob"));

        close_all(&[&client, &server]).await;
    }

    #[tokio::test]
    async fn test_rejection_keeps_details_and_skips_handler() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "signup").await;
        let client = node(&broker, "client").await;
        let invoked = Arc::new(AtomicUsize::new(0));

        {
            let invoked = Arc::clone(&invoked);
            server
                .register_method(
                    "signup",
                    move |_, _, _| {
                        invoked.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<_, RpcError>("welcome") }
                    },
                    SubscribeOptions::new().validator(check_age),
                )
                .await
                .unwrap();
        }

        let call = client.call_method("signup", &json!({ "age": 12 })).unwrap();
        let err = call.await.unwrap_err();
        let rpc = err.rpc().unwrap();
        assert_eq!(rpc.code, codes::VALIDATION_ERROR);
        assert_eq!(rpc.message, "age must be at least 18");
        assert_eq!(rpc.details, Some(json!({ "field": "age" })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let ok = client
            .call_method("signup", &json!({ "age": 30 }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(ok, json!("welcome"));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);

        close_all(&[&client, &server]).await;
    }

    #[tokio::test]
    async fn test_rejection_reply_answers_the_request() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "signup").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "signup",
                |_, _, _| async { Ok::<_, RpcError>("welcome") },
                SubscribeOptions::new().validator(check_age),
            )
            .await
            .unwrap();

        let call = client
            .call(
                "signup",
                &json!({ "age": 12 }),
                CallOptions::new().reply(ReplyMode::Envelope),
            )
            .unwrap();
        let request_id = call.request_id().to_string();
        let whole = call.await.unwrap();

        assert_eq!(whole["fid"], json!(request_id));
        assert_eq!(whole["err"]["code"], json!(codes::VALIDATION_ERROR));
        assert_eq!(whole["err"]["det"], json!({ "field": "age" }));
        assert!(whole.get("data").map_or(true, Value::is_null));

        close_all(&[&client, &server]).await;
    }

    #[tokio::test]
    async fn test_panicking_validator_keeps_method_alive() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "fragile").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "m",
                |data: Value, _, _| async move { Ok::<_, RpcError>(data) },
                SubscribeOptions::new().validator(|data: Value| -> Result<Value, RpcError> {
                    if data == "boom" {
                        panic!("validator blew up");
                    }
                    Ok(data)
                }),
            )
            .await
            .unwrap();

        let err = client
            .call("m", &"boom", CallOptions::new().timeout(WAIT))
            .unwrap()
            .await
            .unwrap_err();
        let rpc = err.rpc().unwrap();
        assert_eq!(rpc.code, codes::INTERNAL_ERROR);
        assert_eq!(rpc.message, "validator blew up");

        let ok = client
            .call("m", &"fine", CallOptions::new().timeout(WAIT))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(ok, json!("fine"));

        close_all(&[&client, &server]).await;
    }

    #[tokio::test]
    async fn test_rejection_is_not_a_server_fault() {
        let broker = InMemoryBroker::new();
        let memory = Arc::new(MemoryLogger::new());
        let server = Connection::builder(ConnectionConfig::with_group("strict"))
            .logger(memory.clone())
            .connect(&broker)
            .await
            .unwrap();
        let client = node(&broker, "client").await;

        server
            .register_method(
                "signup",
                |_, _, _| async { Ok::<_, RpcError>(()) },
                SubscribeOptions::new().validator(check_age),
            )
            .await
            .unwrap();

        let _ = client.call_method("signup", &json!({})).unwrap().await;

        assert_eq!(memory.find(LogLevel::Warn, "message rejected").len(), 1);
        assert!(memory.find(LogLevel::Error, "method handler failed").is_empty());

        close_all(&[&client, &server]).await;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u8,
        #[serde(default)]
        admin: bool,
    }

    #[tokio::test]
    async fn test_typed_validator_end_to_end() {
        let broker = InMemoryBroker::new();
        let server = node(&broker, "people").await;
        let client = node(&broker, "client").await;

        server
            .register_method(
                "person.create",
                |data: Value, _, _| async move { Ok::<_, RpcError>(data) },
                SubscribeOptions::new().validator(TypedValidator::<Person>::new()),
            )
            .await
            .unwrap();

        let normalised = client
            .call_method("person.create", &json!({ "name": "Ada", "age": 36, "extra": 1 }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(normalised, json!({ "name": "Ada", "age": 36, "admin": false }));

        let err = client
            .call_method("person.create", &json!({ "name": "Ada", "age": "old" }))
            .unwrap()
            .await
            .unwrap_err();
        let rpc = err.rpc().unwrap();
        assert_eq!(rpc.code, codes::VALIDATION_ERROR);
        assert_eq!(rpc.message, INVALID_DATA);
        assert!(rpc.details.as_ref().unwrap()["error"].is_string());

        close_all(&[&client, &server]).await;
    }

    #[tokio::test]
    async fn test_event_rejection_skips_event_hook() {
        let broker = InMemoryBroker::new();
        let memory = Arc::new(MemoryLogger::new());
        let hooked = Arc::new(AtomicUsize::new(0));
        let listener = {
            let hooked = Arc::clone(&hooked);
            Connection::builder(ConnectionConfig::with_group("events"))
                .logger(memory.clone())
                .hooks(Hooks::silent().event_error(move |_| {
                    hooked.fetch_add(1, Ordering::SeqCst);
                }))
                .connect(&broker)
                .await
                .unwrap()
        };
        let emitter = node(&broker, "emitters").await;

        listener
            .listen(
                "signup.requested",
                |_, _, _| async { Ok::<_, RpcError>(()) },
                SubscribeOptions::new().validator(check_age),
            )
            .await
            .unwrap();

        emitter
            .emit_event("signup.requested", &json!({ "age": 3 }))
            .await
            .unwrap();

        timeout(WAIT, async {
            while memory.find(LogLevel::Warn, "message rejected").is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(hooked.load(Ordering::SeqCst), 0);

        close_all(&[&emitter, &listener]).await;
    }
}
