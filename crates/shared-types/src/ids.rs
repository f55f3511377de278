//! Message identifiers.
//!
//! Envelope ids use UUID v7: time-ordered, which keeps logs sortable, and
//! unique across processes. Reply inbox tokens use UUID v4 so that reply
//! topics cannot be guessed from earlier ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier stamped on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new message id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

/// Random token for a reply inbox subject.
#[must_use]
pub fn inbox_token() -> String {
    Uuid::new_v4().simple().to_string()
}
