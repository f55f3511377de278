//! # Message Envelope
//!
//! The versioned unit transmitted on the wire for every request, reply and
//! event.
//!
//! ```text
//! { "v": 1, "id": "..", "fid": "..", "ts": 1700000000000,
//!   "data": <any>, "err": {"code": 3, "msg": "..", "det": <any>} }
//! ```
//!
//! ## Properties
//!
//! - **Versioning**: a receiver on a different version rejects the message
//!   with a protocol error instead of guessing at its shape.
//! - **Causality**: `fid` points at the envelope that produced this one
//!   (the request a reply answers, or the event a derived event follows).
//! - **Exclusivity**: an envelope carrying `err` carries no `data`.

use crate::errors::RpcError;
use crate::ids::MessageId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version. Checked before anything else is interpreted.
    #[serde(rename = "v")]
    pub version: u32,

    /// Globally unique id; the request id or event id.
    pub id: String,

    /// Id of the envelope that causally produced this one.
    #[serde(rename = "fid", default, skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,

    /// Milliseconds since the Unix epoch at construction.
    #[serde(rename = "ts")]
    pub timestamp: u64,

    /// Opaque payload. Absent on the wire when null.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Structured error, only on replies.
    #[serde(rename = "err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// An encoded envelope ready to publish.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// The id stamped on the envelope.
    pub id: String,
    /// Wire bytes.
    pub bytes: Vec<u8>,
    /// The envelope that was encoded, kept for logging.
    pub envelope: Envelope,
}

impl Envelope {
    /// Build a fresh envelope carrying `data`.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id: MessageId::new().to_string(),
            from_id: None,
            timestamp: now_ms(),
            data,
            error: None,
        }
    }

    /// Build a fresh error-bearing envelope. The payload is always null.
    #[must_use]
    pub fn failure(error: RpcError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(Value::Null)
        }
    }

    /// Build the reply to `request` from a handler outcome.
    #[must_use]
    pub fn reply(request: &Envelope, outcome: Result<Value, RpcError>) -> Self {
        let reply = match outcome {
            Ok(data) => Self::new(data),
            Err(error) => Self::failure(error),
        };
        reply.caused_by(request.id.clone())
    }

    /// Set the causal pointer.
    #[must_use]
    pub fn caused_by(mut self, from_id: impl Into<String>) -> Self {
        self.from_id = Some(from_id.into());
        self
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The payload, or the carried error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Encode a new envelope.
///
/// Generates a fresh id and timestamp. Fails only when `data` cannot be
/// represented as JSON.
pub fn encode<T: Serialize + ?Sized>(
    data: &T,
    error: Option<RpcError>,
    from_id: Option<&str>,
) -> Result<Encoded, serde_json::Error> {
    let mut envelope = match error {
        Some(error) => Envelope::failure(error),
        None => Envelope::new(serde_json::to_value(data)?),
    };
    envelope.from_id = from_id.map(str::to_owned);
    encode_envelope(envelope)
}

/// Encode an already built envelope.
pub fn encode_envelope(envelope: Envelope) -> Result<Encoded, serde_json::Error> {
    let bytes = envelope.to_bytes()?;
    Ok(Encoded {
        id: envelope.id.clone(),
        bytes,
        envelope,
    })
}

/// Decode wire bytes.
///
/// All-or-nothing: unparseable bytes, missing or mistyped required fields, and
/// a foreign protocol version each fail with a protocol error.
pub fn decode(bytes: &[u8]) -> Result<Envelope, RpcError> {
    let raw: Value = serde_json::from_slice(bytes).map_err(|_| {
        RpcError::protocol(
            "Invalid message string",
            Value::String(String::from_utf8_lossy(bytes).into_owned()),
        )
    })?;

    if !raw.is_object() {
        return Err(RpcError::protocol("Invalid message object", raw));
    }

    if let Some(version) = raw.get("v").and_then(Value::as_u64) {
        if version != u64::from(PROTOCOL_VERSION) {
            return Err(RpcError::protocol(
                format!("Unsupported version: received {version}, supported {PROTOCOL_VERSION}"),
                raw,
            ));
        }
    }

    match serde_json::from_value::<Envelope>(raw.clone()) {
        Ok(envelope) => Ok(envelope),
        Err(_) => Err(RpcError::protocol("Invalid message object", raw)),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
