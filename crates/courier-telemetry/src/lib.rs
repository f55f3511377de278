//! # Courier Telemetry
//!
//! Logging and metrics setup shared by every Courier process.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` registry with an `EnvFilter`, pretty or JSON
//! - **Metrics**: Prometheus counters for message traffic, see [`metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use courier_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `COURIER_SERVICE_NAME` | `courier` | Service name in logs |
//! | `COURIER_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `COURIER_JSON_LOGS` | `false` | JSON output (defaults to true in containers) |
//! | `COURIER_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{gather_metrics, register_metrics};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first (synchronous, idempotent)
    register_metrics()?;

    let tracing = init_tracing(config)?;

    Ok(TelemetryGuard { _tracing: tracing })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
}

/// Install a subscriber for test binaries, ignoring an already installed one.
pub fn init_test_tracing() {
    let _ = init_tracing(&TelemetryConfig::for_tests()).map(std::mem::forget);
}
