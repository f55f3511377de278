//! # Shared Types Crate
//!
//! The wire contract shared by every process on the bus: the versioned
//! [`Envelope`], its codec, and the [`RpcError`] taxonomy that crosses
//! process boundaries.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: one envelope schema, one protocol version.
//! - **All-or-nothing decoding**: malformed or foreign-version envelopes are
//!   rejected with a protocol error, never partially interpreted.
//! - **Typed errors on the wire**: every failure a caller can observe has a
//!   code, a message and optional structured details.

pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{decode, encode, encode_envelope, Encoded, Envelope, PROTOCOL_VERSION};
pub use errors::{codes, ErrorKind, RpcError};
pub use ids::{inbox_token, MessageId};
