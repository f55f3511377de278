//! Prometheus metrics for message traffic.
//!
//! All metrics follow the naming convention: `courier_<metric>_<unit>`
//!
//! ## Labels
//!
//! - `kind`: `request`, `response` or `event`
//! - `code`: the wire error code of a failed handler

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Crate metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Envelopes published, by kind
    pub static ref MESSAGES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("courier_messages_sent_total", "Envelopes published"),
        &["kind"]
    ).expect("metric creation failed");

    /// Envelopes received, by kind
    pub static ref MESSAGES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("courier_messages_received_total", "Envelopes received"),
        &["kind"]
    ).expect("metric creation failed");

    /// Handler failures, by wire code
    pub static ref HANDLER_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("courier_handler_errors_total", "Handler failures by error code"),
        &["code"]
    ).expect("metric creation failed");

    /// Calls that resolved by timeout
    pub static ref CALL_TIMEOUTS: IntCounter = IntCounter::new(
        "courier_call_timeouts_total",
        "Calls that received no reply before their deadline"
    ).expect("metric creation failed");

    /// Inbound messages dropped as undecodable
    pub static ref PROTOCOL_ERRORS: IntCounter = IntCounter::new(
        "courier_protocol_errors_total",
        "Inbound messages dropped because they could not be decoded"
    ).expect("metric creation failed");

    /// Handlers and calls currently in flight
    pub static ref IN_FLIGHT: IntGauge = IntGauge::new(
        "courier_in_flight",
        "Handlers and outbound calls currently executing"
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`].
///
/// Idempotent: metrics already registered are left in place.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_SENT.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(HANDLER_ERRORS.clone()),
        Box::new(CALL_TIMEOUTS.clone()),
        Box::new(PROTOCOL_ERRORS.clone()),
        Box::new(IN_FLIGHT.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    register_metrics()?;

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count a published envelope.
pub fn record_sent(kind: &str) {
    MESSAGES_SENT.with_label_values(&[kind]).inc();
}

/// Count a received envelope.
pub fn record_received(kind: &str) {
    MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
}

/// Count a failed handler.
pub fn record_handler_error(code: i32) {
    let code = code.to_string();
    HANDLER_ERRORS.with_label_values(&[code.as_str()]).inc();
}
