//! Bits payloads: cheers and badge unlocks.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// BitsMessage
// ============================================================================

/// A cheer in a channel (`channel-bits-events-v1`).
///
/// # Format
///
/// ```json
/// {
///   "data": {
///     "user_name": "dallasnchains",
///     "channel_name": "dallas",
///     "user_id": "129454141",
///     "channel_id": "44322889",
///     "time": "2017-02-09T13:23:58.168Z",
///     "chat_message": "cheer10000 New badge hype!",
///     "bits_used": 10000,
///     "total_bits_used": 25000,
///     "context": "cheer",
///     "badge_entitlement": { "new_version": 25000, "previous_version": 10000 }
///   },
///   "version": "1.0",
///   "message_type": "bits_event",
///   "message_id": "8145728a4-35f0-4cf7-9dc0-f2ef24de1eb6"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BitsMessage {
    data: BitsData,
    version: String,
    message_type: String,
    message_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct BitsData {
    user_id: Option<String>,
    user_name: Option<String>,
    channel_id: String,
    channel_name: String,
    time: String,
    chat_message: String,
    bits_used: u64,
    total_bits_used: u64,
    context: String,
    badge_entitlement: Option<BadgeEntitlement>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct BadgeEntitlement {
    new_version: u64,
    previous_version: u64,
}

impl BitsMessage {
    /// ID of the cheering user, `None` for anonymous cheers.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.data.user_id.as_deref()
    }

    /// Login of the cheering user, `None` for anonymous cheers.
    #[inline]
    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.data.user_name.as_deref()
    }

    /// Returns `true` if the cheer was anonymous.
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.data.user_id.is_none()
    }

    #[inline]
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.data.channel_id
    }

    #[inline]
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.data.channel_name
    }

    /// Chat message sent with the cheer.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.data.chat_message
    }

    /// Bits used in this cheer.
    #[inline]
    #[must_use]
    pub fn bits(&self) -> u64 {
        self.data.bits_used
    }

    /// Total bits the user has cheered in the channel.
    #[inline]
    #[must_use]
    pub fn total_bits(&self) -> u64 {
        self.data.total_bits_used
    }

    /// RFC 3339 timestamp of the cheer.
    #[inline]
    #[must_use]
    pub fn time(&self) -> &str {
        &self.data.time
    }

    /// New badge tier unlocked by this cheer, if any.
    #[inline]
    #[must_use]
    pub fn unlocked_badge(&self) -> Option<u64> {
        self.data
            .badge_entitlement
            .as_ref()
            .map(|entitlement| entitlement.new_version)
    }

    #[inline]
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

// ============================================================================
// BitsBadgeUnlockMessage
// ============================================================================

/// A new Bits badge tier shared in chat (`channel-bits-badge-unlocks`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BitsBadgeUnlockMessage {
    user_id: String,
    user_name: String,
    channel_id: String,
    channel_name: String,
    badge_tier: u64,
    chat_message: Option<String>,
    time: String,
}

impl BitsBadgeUnlockMessage {
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[inline]
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    #[inline]
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    #[inline]
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Unlocked badge tier in bits.
    #[inline]
    #[must_use]
    pub fn badge_tier(&self) -> u64 {
        self.badge_tier
    }

    /// Message the user shared with the unlock, if any.
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.chat_message.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn time(&self) -> &str {
        &self.time
    }
}

// ============================================================================
// Tests
// ============================================================================
