//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use twitch_pubsub::PubSubClient;
//!
//! # async fn example() -> twitch_pubsub::Result<()> {
//! let client = PubSubClient::builder()
//!     .ping_interval(Duration::from_secs(30))
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;
use crate::transport::ConnectionConfig;

use super::core::PubSubClient;

// ============================================================================
// PubSubClientBuilder
// ============================================================================

/// Builder for configuring a [`PubSubClient`].
///
/// Use [`PubSubClient::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct PubSubClientBuilder {
    config: ConnectionConfig,
}

impl PubSubClientBuilder {
    /// Creates a builder with the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Sets the interval between liveness probes.
    #[inline]
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Sets how long to wait for a `PONG` before reconnecting.
    #[inline]
    #[must_use]
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.config.pong_timeout = timeout;
        self
    }

    /// Sets the bound on one handshake attempt.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the bound on a `LISTEN`/`UNLISTEN` round trip.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the backoff step length and the cap on a single delay.
    ///
    /// # Arguments
    ///
    /// * `unit` - Length of one Fibonacci step
    /// * `max` - Longest delay between two attempts
    #[inline]
    #[must_use]
    pub fn backoff(mut self, unit: Duration, max: Duration) -> Self {
        self.config.backoff_unit = unit;
        self.config.max_backoff = max;
        self
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the client.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn build(self) -> Result<PubSubClient> {
        self.config.validate()?;
        Ok(PubSubClient::from_config(self.config))
    }
}

// ============================================================================
// Tests
// ============================================================================
