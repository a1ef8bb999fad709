//! Typed topic payloads.
//!
//! Each topic kind decodes its nested `MESSAGE` payload into one shape:
//!
//! | Topic kind | Payload |
//! |------------|---------|
//! | [`TopicKind::Bits`] | [`BitsMessage`] |
//! | [`TopicKind::BitsBadgeUnlocks`] | [`BitsBadgeUnlockMessage`] |
//! | [`TopicKind::Subscriptions`] | [`SubscriptionMessage`] |
//! | [`TopicKind::Commerce`] | [`CommerceMessage`] |
//! | [`TopicKind::Whispers`] | [`WhisperMessage`] |

// ============================================================================
// Submodules
// ============================================================================

/// Bits cheers and badge unlocks.
pub mod bits;

/// Subscriptions and commerce purchases.
pub mod subscription;

/// Whispers.
pub mod whisper;

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::TopicKind;

// ============================================================================
// Re-exports
// ============================================================================

pub use bits::{BitsBadgeUnlockMessage, BitsMessage};
pub use subscription::{CommerceMessage, EmoteRange, MessageText, SubscriptionMessage};
pub use whisper::{WhisperBadge, WhisperMessage};

// ============================================================================
// PubSubMessage
// ============================================================================

/// A decoded topic payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PubSubMessage {
    /// Bits cheer.
    Bits(BitsMessage),
    /// Bits badge unlock.
    BitsBadgeUnlock(BitsBadgeUnlockMessage),
    /// Subscription.
    Subscription(SubscriptionMessage),
    /// Commerce purchase.
    Commerce(CommerceMessage),
    /// Whisper.
    Whisper(WhisperMessage),
}

impl PubSubMessage {
    /// Decodes a payload into the shape belonging to `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload does not match the shape.
    pub fn decode(kind: TopicKind, payload: Value) -> Result<Self> {
        let decoded = match kind {
            TopicKind::Bits => serde_json::from_value(payload).map(Self::Bits),
            TopicKind::BitsBadgeUnlocks => {
                serde_json::from_value(payload).map(Self::BitsBadgeUnlock)
            }
            TopicKind::Subscriptions => serde_json::from_value(payload).map(Self::Subscription),
            TopicKind::Commerce => serde_json::from_value(payload).map(Self::Commerce),
            TopicKind::Whispers => serde_json::from_value(payload).map(Self::Whisper),
        };

        decoded.map_err(|e| Error::protocol(format!("invalid {kind} payload: {e}")))
    }

    /// Returns the topic kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> TopicKind {
        match self {
            Self::Bits(_) => TopicKind::Bits,
            Self::BitsBadgeUnlock(_) => TopicKind::BitsBadgeUnlocks,
            Self::Subscription(_) => TopicKind::Subscriptions,
            Self::Commerce(_) => TopicKind::Commerce,
            Self::Whisper(_) => TopicKind::Whispers,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_decode_matches_kind() {
        for kind in TopicKind::ALL {
            let message = PubSubMessage::decode(kind, json!({})).expect("defaults decode");
            assert_eq!(message.kind(), kind);
        }
    }

    #[test]
    fn test_decode_bits() {
        let message = PubSubMessage::decode(
            TopicKind::Bits,
            json!({ "data": { "bits_used": 100, "channel_id": "42" } }),
        )
        .expect("decode");

        let PubSubMessage::Bits(bits) = message else {
            panic!("expected bits");
        };
        assert_eq!(bits.bits(), 100);
        assert_eq!(bits.channel_id(), "42");
    }

    #[test]
    fn test_decode_shape_mismatch() {
        let result = PubSubMessage::decode(TopicKind::Bits, json!({ "data": { "bits_used": "many" } }));
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }
}
