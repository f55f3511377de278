//! # Integration Scenarios
//!
//! Shared fixtures for the scenario modules.

pub mod events;
pub mod malformed;
pub mod shutdown;
pub mod validation;

use courier::{Connection, ConnectionConfig, Hooks, InMemoryBroker};
use std::time::Duration;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// Connect a node in `group` with failure hooks silenced.
pub async fn node(broker: &InMemoryBroker, group: &str) -> Connection {
    courier_telemetry::init_test_tracing();
    Connection::builder(ConnectionConfig::with_group(group))
        .hooks(Hooks::silent())
        .connect(broker)
        .await
        .expect("in-memory broker accepts connections")
}

/// Close every connection, in order.
pub async fn close_all(connections: &[&Connection]) {
    for connection in connections {
        connection.close().await.expect("close succeeds");
    }
}
