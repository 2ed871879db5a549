//! Client configuration and construction-time validation.

use std::time::Duration;

use url::Url;

use hublink_protocol::constants::WS_REQUEST_TIMEOUT;

use crate::types::RetryPolicy;

/// Configuration errors. Raised synchronously at construction; network
/// conditions never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("hub URL has no host")]
    MissingHost,

    #[error("request timeout must be non-zero")]
    ZeroTimeout,

    #[error("retry jitter must be non-zero")]
    ZeroJitter,
}

/// Configuration for a hub connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the remote hub.
    pub url: String,
    /// Timeout for request/response invocations.
    pub request_timeout: Duration,
    /// Reconnection delay policy.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: WS_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Validates the address and options. Fails only on malformed
    /// configuration, fatal to the epoch that used it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::MissingHost);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.retry.max_jitter.is_zero() {
            return Err(ConfigError::ZeroJitter);
        }
        Ok(())
    }
}
