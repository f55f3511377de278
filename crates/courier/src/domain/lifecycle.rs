//! Connection lifecycle and message classification.

use std::fmt;

/// Lifecycle of a connection.
///
/// ```text
/// Open ──close()──→ Draining ──counter == 0──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accepting calls, emits and registrations.
    Open,
    /// Handler subscriptions removed, waiting for in-flight work.
    Draining,
    /// Transport closed.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an envelope is, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Expects a reply.
    Request,
    /// Answers a request.
    Response,
    /// Fire and forget.
    Event,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
        }
    }

    /// Classify an inbound message by whether it names a reply subject.
    #[must_use]
    pub fn inbound(reply: Option<&str>) -> Self {
        if reply.is_some() {
            Self::Request
        } else {
            Self::Event
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
