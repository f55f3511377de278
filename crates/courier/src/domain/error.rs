//! Connection-level errors.

use crate::domain::config::ConfigError;
use crate::domain::lifecycle::ConnectionState;
use shared_bus::TransportError;
use shared_types::{ErrorKind, RpcError};
use thiserror::Error;

/// Errors surfaced by [`Connection`](crate::Connection) operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// A typed error: the remote error of a call, a timeout, or a protocol
    /// error decoding the reply.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The payload could not be represented as JSON.
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection is draining or closed.
    #[error("connection is {0}")]
    NotOpen(ConnectionState),

    /// The task resolving a call went away without a result.
    #[error("call abandoned before it resolved")]
    Abandoned,
}

/// Result alias for connection operations.
pub type CourierResult<T> = Result<T, CourierError>;

impl CourierError {
    /// The typed error, when there is one.
    #[must_use]
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(err) => Some(err),
            _ => None,
        }
    }

    /// Wire code of the typed error.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.rpc().map(|err| err.code)
    }

    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.rpc().map(RpcError::kind)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.rpc().is_some_and(RpcError::is_timeout)
    }
}
