//! Wire envelopes exchanged with the PubSub service.
//!
//! Every frame is a JSON text message discriminated by its `type` field.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::Nonce;

// ============================================================================
// ListenData
// ============================================================================

/// Body of a `LISTEN` / `UNLISTEN` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenData {
    /// Topics to (un)subscribe.
    pub topics: Vec<String>,

    /// Access token authorizing the topics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl ListenData {
    /// Creates a body for a single topic.
    #[inline]
    #[must_use]
    pub fn single(topic: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            topics: vec![topic.into()],
            auth_token,
        }
    }
}

// ============================================================================
// NoncedRequest
// ============================================================================

/// A request that expects a `RESPONSE`, before its nonce is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoncedRequest {
    /// Subscribe to topics.
    Listen(ListenData),
    /// Unsubscribe from topics.
    Unlisten(ListenData),
}

impl NoncedRequest {
    /// Attaches a nonce, producing the packet to put on the wire.
    #[must_use]
    pub fn with_nonce(self, nonce: Nonce) -> OutgoingPacket {
        match self {
            Self::Listen(data) => OutgoingPacket::Listen { nonce, data },
            Self::Unlisten(data) => OutgoingPacket::Unlisten { nonce, data },
        }
    }
}

// ============================================================================
// OutgoingPacket
// ============================================================================

/// A packet sent from the client to the service.
///
/// # Format
///
/// ```json
/// { "type": "LISTEN", "nonce": "…", "data": { "topics": ["…"], "auth_token": "…" } }
/// { "type": "PING" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingPacket {
    /// Subscribe request.
    Listen {
        /// Correlation nonce.
        nonce: Nonce,
        /// Topics and token.
        data: ListenData,
    },
    /// Unsubscribe request.
    Unlisten {
        /// Correlation nonce.
        nonce: Nonce,
        /// Topics and token.
        data: ListenData,
    },
    /// Liveness probe.
    Ping,
}

impl OutgoingPacket {
    /// Returns the nonce of a nonced packet.
    #[inline]
    #[must_use]
    pub fn nonce(&self) -> Option<&Nonce> {
        match self {
            Self::Listen { nonce, .. } | Self::Unlisten { nonce, .. } => Some(nonce),
            Self::Ping => None,
        }
    }

    /// Serializes the packet to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// IncomingPacket
// ============================================================================

/// A packet received from the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingPacket {
    /// Answer to a `PING`.
    Pong,

    /// The service asks the client to reconnect.
    Reconnect,

    /// Answer to a nonced request.
    Response {
        /// Nonce of the request being answered.
        #[serde(default)]
        nonce: Option<Nonce>,
        /// Error string; empty or absent means success.
        #[serde(default)]
        error: Option<String>,
    },

    /// Topic message.
    Message {
        /// Topic and encoded payload.
        data: MessageData,
    },

    /// Any type this client does not understand.
    #[serde(other)]
    Unknown,
}

impl IncomingPacket {
    /// Parses a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the frame is not a valid envelope.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// MessageData
// ============================================================================

/// Body of a `MESSAGE` packet.
///
/// `message` is itself JSON encoded and decoded a second time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageData {
    /// Topic the message was published on.
    pub topic: String,

    /// Encoded payload.
    pub message: String,
}

impl MessageData {
    /// Decodes the nested payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not valid JSON.
    pub fn payload(&self) -> Result<Value> {
        serde_json::from_str(&self.message).map_err(|e| {
            Error::protocol(format!("invalid payload on topic {}: {e}", self.topic))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
