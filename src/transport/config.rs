//! Connection settings.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::backoff::{DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_BACKOFF};

// ============================================================================
// Constants
// ============================================================================

/// Public PubSub endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://pubsub-edge.twitch.tv";

/// Interval between liveness probes.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Time allowed for a `PONG` after a `PING`.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for one WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for a nonced request's `RESPONSE`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Settings for the shared PubSub connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: String,

    /// Interval between liveness probes.
    pub ping_interval: Duration,

    /// Time allowed for a `PONG` before forcing a reconnect.
    pub pong_timeout: Duration,

    /// Bound on a single handshake attempt.
    pub connect_timeout: Duration,

    /// Bound on a nonced request round trip.
    pub request_timeout: Duration,

    /// Length of one Fibonacci backoff step.
    pub backoff_unit: Duration,

    /// Cap on a single backoff delay.
    pub max_backoff: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl ConnectionConfig {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is not a `ws`/`wss` URL
    /// - [`Error::Config`] if an interval or timeout is zero
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {}: {e}", self.endpoint)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "endpoint must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        let durations = [
            ("ping_interval", self.ping_interval),
            ("pong_timeout", self.pong_timeout),
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.endpoint, "wss://pubsub-edge.twitch.tv");
        assert_eq!(config.ping_interval.as_secs(), 60);
        assert_eq!(config.pong_timeout.as_secs(), 10);
        assert_eq!(config.max_backoff.as_secs(), 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_http_scheme() {
        let config = ConnectionConfig {
            endpoint: "https://pubsub-edge.twitch.tv".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_garbage_endpoint() {
        let config = ConnectionConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = ConnectionConfig {
            pong_timeout: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().expect_err("zero timeout");
        assert!(err.to_string().contains("pong_timeout"));
    }
}
