//! Error types for the PubSub client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use twitch_pubsub::{PubSubClient, Result, UserId};
//!
//! async fn example(client: &PubSubClient) -> Result<()> {
//!     let listener = client.on_bits(&UserId::from("42"), |message, _ctx| {
//!         println!("{} bits", message.bits());
//!     }).await?;
//!     listener.remove();
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Request | [`Error::Request`], [`Error::RequestTimeout`], [`Error::Protocol`] |
//! | Identity | [`Error::Authentication`], [`Error::UnregisteredIdentity`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{Nonce, UserId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket handshake never completed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete within the connect timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The service rejected a LISTEN/UNLISTEN request.
    ///
    /// Carries the non-empty `error` string of the `RESPONSE` packet.
    #[error("Request rejected: {message}")]
    Request {
        /// Error string reported by the service.
        message: String,
    },

    /// No `RESPONSE` arrived for a nonced request in time.
    #[error("Request {nonce} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Nonce of the abandoned request.
        nonce: Nonce,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Malformed envelope or payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Identity Errors
    // ========================================================================
    /// Access token is invalid and could not be refreshed.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of the authentication failure.
        message: String,
    },

    /// Operation on an identity that was never registered.
    #[error("Identity not registered: {user_id}")]
    UnregisteredIdentity {
        /// The unknown user ID.
        user_id: UserId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a request error from a service error string.
    #[inline]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(nonce: Nonce, timeout_ms: u64) -> Self {
        Self::RequestTimeout { nonce, timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[inline]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an unregistered identity error.
    #[inline]
    pub fn unregistered_identity(user_id: UserId) -> Self {
        Self::UnregisteredIdentity { user_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry once the connection
    /// has been re-established.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::RequestTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("socket closed before open");
        assert_eq!(
            err.to_string(),
            "Connection failed: socket closed before open"
        );
    }

    #[test]
    fn test_request_error_display() {
        let err = Error::request("ERR_BADAUTH");
        assert_eq!(err.to_string(), "Request rejected: ERR_BADAUTH");
    }

    #[test]
    fn test_unregistered_identity_display() {
        let err = Error::unregistered_identity(UserId::from("42"));
        assert_eq!(err.to_string(), "Identity not registered: 42");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(Nonce::generate(), 10_000);
        let other_err = Error::request("ERR_BADTOPIC");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::connection_timeout(1000);
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::authentication("expired");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::ConnectionClosed.is_recoverable());
        assert!(!Error::request("ERR_BADAUTH").is_recoverable());
        assert!(!Error::unregistered_identity(UserId::from("1")).is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
