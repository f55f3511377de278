//! # Error Taxonomy
//!
//! The closed set of code-bearing errors that cross process boundaries.
//!
//! Every error carried inside an envelope is an [`RpcError`]. The code is a
//! plain integer on the wire so that handlers may attach their own codes; the
//! four codes in [`codes`] form the taxonomy this layer itself produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Wire error codes.
pub mod codes {
    /// No reply arrived within the caller's deadline. Local only, never sent.
    pub const TIMEOUT: i32 = 1;
    /// Malformed or version-mismatched envelope.
    pub const PROTOCOL_ERROR: i32 = 2;
    /// Handler-level input rejection.
    pub const VALIDATION_ERROR: i32 = 3;
    /// Uncaught handler fault.
    pub const INTERNAL_ERROR: i32 = 4;
}

/// Classification of an [`RpcError`] code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Protocol,
    Validation,
    Internal,
    /// A code attached by a handler that is outside the taxonomy.
    Other(i32),
}

impl ErrorKind {
    /// Classify a wire code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            codes::TIMEOUT => Self::Timeout,
            codes::PROTOCOL_ERROR => Self::Protocol,
            codes::VALIDATION_ERROR => Self::Validation,
            codes::INTERNAL_ERROR => Self::Internal,
            other => Self::Other(other),
        }
    }

    /// The wire code for this kind.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Timeout => codes::TIMEOUT,
            Self::Protocol => codes::PROTOCOL_ERROR,
            Self::Validation => codes::VALIDATION_ERROR,
            Self::Internal => codes::INTERNAL_ERROR,
            Self::Other(code) => code,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "ERROR_{code}"),
            kind => f.write_str(kind.as_str()),
        }
    }
}

/// A typed, wire-transmissible error.
///
/// Serialized inside the envelope as `{"code": .., "msg": .., "det": ..}`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RpcError {
    /// Wire error code (see [`codes`]).
    pub code: i32,
    /// Human readable message.
    #[serde(rename = "msg")]
    pub message: String,
    /// Arbitrary structured details, e.g. field-level violations.
    #[serde(rename = "det", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcError {
    /// Create an error with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error with an explicit code and details.
    pub fn with_details(code: i32, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Malformed or version-mismatched envelope.
    pub fn protocol(message: impl Into<String>, details: Value) -> Self {
        Self::with_details(
            codes::PROTOCOL_ERROR,
            format!("PROTOCOL_ERROR: {}", message.into()),
            details,
        )
    }

    /// Rejected input. The message is taken verbatim.
    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        Self::with_details(codes::VALIDATION_ERROR, message, details)
    }

    /// Uncaught handler fault. Carries no details unless attached explicitly.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// No reply observed on `topic` before the deadline.
    pub fn timeout(topic: &str, data: &Value, timeout_ms: u128) -> Self {
        Self::with_details(
            codes::TIMEOUT,
            format!("TIMEOUT: no reply from '{topic}' within {timeout_ms}ms"),
            serde_json::json!({ "topic": topic, "data": data }),
        )
    }

    /// Attach details, replacing any present.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Classify this error's code.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Handler errors without a code of their own become internal errors.
///
/// An [`RpcError`] anywhere in the chain keeps its code and details.
impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc) => rpc,
            Err(err) => match err.chain().find_map(|cause| cause.downcast_ref::<RpcError>()) {
                Some(rpc) => rpc.clone(),
                None => Self::internal(err.to_string()),
            },
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("failed to serialize handler result: {err}"))
    }
}
