//! Connection configuration with validation, and per-operation options.

use serde::{Deserialize, Serialize};
use shared_bus::{subject, ConnectOptions, ReconnectPolicy, ServerAddrs};
use shared_types::RpcError;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default broker endpoint.
pub const DEFAULT_URL: &str = "nats://localhost:4222";

/// Default deadline for calls, in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// Default wait between reconnect attempts, in milliseconds.
pub const DEFAULT_RECONNECT_WAIT_MS: u64 = 1_000;

/// Default prefix of reply inbox subjects.
pub const DEFAULT_INBOX_PREFIX: &str = "_INBOX";

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Broker endpoint(s), comma separated for a cluster.
    pub url: String,

    /// Queue group shared by processes that should compete for methods and
    /// grouped events. `None` means every process receives every message.
    pub group: Option<String>,

    /// Keep retrying when the broker is unreachable at startup.
    pub reconnect_on_start: bool,

    /// Reconnect after losing an established connection.
    pub reconnect_on_disconnect: bool,

    /// Wait between reconnect attempts.
    pub reconnect_wait_ms: u64,

    /// Log transport connection events.
    pub log_transport_events: bool,

    /// Log every sent and received envelope.
    pub log_message_events: bool,

    /// Log handler failures.
    pub log_message_errors: bool,

    /// Deadline for calls that do not set their own.
    pub default_call_timeout_ms: u64,

    /// Prefix of reply inbox subjects.
    pub inbox_prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            group: None,
            reconnect_on_start: false,
            reconnect_on_disconnect: true,
            reconnect_wait_ms: DEFAULT_RECONNECT_WAIT_MS,
            log_transport_events: true,
            log_message_events: true,
            log_message_errors: true,
            default_call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Configuration with the given queue group and defaults elsewhere.
    pub fn with_group(group: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_URL`: Broker endpoint(s) (default: nats://localhost:4222)
    /// - `COURIER_GROUP`: Queue group (default: none)
    /// - `COURIER_RECONNECT_ON_START`: Retry the first connect (default: false)
    /// - `COURIER_RECONNECT_ON_DISCONNECT`: Reconnect after a drop (default: true)
    /// - `COURIER_CALL_TIMEOUT_MS`: Default call deadline (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            url: env::var("COURIER_URL").unwrap_or(defaults.url),

            group: env::var("COURIER_GROUP").ok().filter(|g| !g.is_empty()),

            reconnect_on_start: env::var("COURIER_RECONNECT_ON_START")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.reconnect_on_start),

            reconnect_on_disconnect: env::var("COURIER_RECONNECT_ON_DISCONNECT")
                .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
                .unwrap_or(defaults.reconnect_on_disconnect),

            default_call_timeout_ms: env::var("COURIER_CALL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_call_timeout_ms),

            ..defaults
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconnect_policy()?;
        self.servers()?;

        if self.default_call_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if !subject::is_valid_subject(&self.inbox_prefix) {
            return Err(ConfigError::InvalidInboxPrefix(self.inbox_prefix.clone()));
        }

        if let Some(group) = &self.group {
            if group.is_empty() || group.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidGroup(group.clone()));
            }
        }

        Ok(())
    }

    /// Endpoints parsed from `url`.
    pub fn servers(&self) -> Result<ServerAddrs, ConfigError> {
        let mut urls: Vec<String> = self
            .url
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned)
            .collect();

        match urls.len() {
            0 => Err(ConfigError::EmptyUrl),
            1 => Ok(ServerAddrs::Single(urls.remove(0))),
            _ => Ok(ServerAddrs::Cluster(urls)),
        }
    }

    /// Reconnection behaviour derived from the two reconnect flags.
    ///
    /// | start | disconnect | policy |
    /// |-------|------------|--------|
    /// | true  | true       | `Always` (waits for the first connect) |
    /// | false | true       | `OnDisconnect` |
    /// | false | false      | `Disabled` |
    /// | true  | false      | rejected |
    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let wait = Duration::from_millis(self.reconnect_wait_ms);
        match (self.reconnect_on_start, self.reconnect_on_disconnect) {
            (true, true) => Ok(ReconnectPolicy::Always { wait }),
            (false, true) => Ok(ReconnectPolicy::OnDisconnect { wait }),
            (false, false) => Ok(ReconnectPolicy::Disabled),
            (true, false) => Err(ConfigError::UnsupportedReconnect),
        }
    }

    /// Options handed to the transport connector.
    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        Ok(ConnectOptions {
            servers: self.servers()?,
            reconnect: self.reconnect_policy()?,
        })
    }

    #[must_use]
    pub fn default_call_timeout(&self) -> Duration {
        Duration::from_millis(self.default_call_timeout_ms)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("reconnect_on_start=true requires reconnect_on_disconnect=true")]
    UnsupportedReconnect,

    #[error("no broker url configured")]
    EmptyUrl,

    #[error("default call timeout cannot be 0")]
    InvalidTimeout,

    #[error("invalid inbox prefix: {0:?}")]
    InvalidInboxPrefix(String),

    #[error("invalid queue group: {0:?}")]
    InvalidGroup(String),
}

/// How a call resolves once its reply arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMode {
    /// The reply payload; an error reply becomes an error.
    #[default]
    Data,
    /// The whole decoded reply envelope, error replies included.
    Envelope,
    /// The whole decoded reply envelope; an error reply becomes an error.
    EnvelopeOrError,
}

/// Options for a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Deadline; the connection default applies when unset.
    pub timeout: Option<Duration>,
    /// Causal pointer stamped on the request envelope.
    pub from_id: Option<String>,
    pub reply: ReplyMode,
}

impl CallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn from_id(mut self, from_id: impl Into<String>) -> Self {
        self.from_id = Some(from_id.into());
        self
    }

    #[must_use]
    pub fn reply(mut self, reply: ReplyMode) -> Self {
        self.reply = reply;
        self
    }
}

/// Options for a single emit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitOptions {
    /// Error to carry instead of data.
    pub error: Option<RpcError>,
    /// Causal pointer stamped on the envelope.
    pub from_id: Option<String>,
}

impl EmitOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn error(mut self, error: RpcError) -> Self {
        self.error = Some(error);
        self
    }

    #[must_use]
    pub fn from_id(mut self, from_id: impl Into<String>) -> Self {
        self.from_id = Some(from_id.into());
        self
    }
}
