//! Topic naming and the enumerated event types.
//!
//! Every topic is namespaced by the user it belongs to:
//!
//! ```text
//! channel-bits-events-v1.42
//! └──── event type ────┘ └┘ user ID
//! ```
//!
//! Only the first `.` separates the event type from the rest, so the
//! remainder is taken verbatim as the user ID.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::UserId;

// ============================================================================
// TopicKind
// ============================================================================

/// Event types the client can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    /// Bits cheered in a channel.
    Bits,
    /// A user unlocked a new Bits badge tier.
    BitsBadgeUnlocks,
    /// Subscriptions, resubscriptions and gifted subscriptions.
    Subscriptions,
    /// Commerce purchases in a channel.
    Commerce,
    /// Whispers received by the user.
    Whispers,
}

impl TopicKind {
    /// All known event types.
    pub const ALL: [TopicKind; 5] = [
        Self::Bits,
        Self::BitsBadgeUnlocks,
        Self::Subscriptions,
        Self::Commerce,
        Self::Whispers,
    ];

    /// Returns the event type name used as the topic prefix.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bits => "channel-bits-events-v1",
            Self::BitsBadgeUnlocks => "channel-bits-badge-unlocks",
            Self::Subscriptions => "channel-subscribe-events-v1",
            Self::Commerce => "channel-commerce-events-v1",
            Self::Whispers => "whispers",
        }
    }

    /// Looks up an event type by its topic prefix.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// OAuth scope the access token must carry for this topic, if any.
    #[inline]
    #[must_use]
    pub const fn required_scope(&self) -> Option<&'static str> {
        match self {
            Self::Subscriptions => Some("channel_subscriptions"),
            Self::Whispers => Some("whispers:read"),
            Self::Bits | Self::BitsBadgeUnlocks | Self::Commerce => None,
        }
    }

    /// Builds the full topic name for a user.
    #[inline]
    #[must_use]
    pub fn topic(&self, user_id: &UserId) -> String {
        format!("{}.{}", self.as_str(), user_id)
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Topic Parsing
// ============================================================================

/// Splits a topic into its event type name and the user-scoped remainder.
///
/// Returns `None` if the topic has no `.` separator.
#[inline]
#[must_use]
pub fn split_topic(topic: &str) -> Option<(&str, &str)> {
    topic.split_once('.')
}

// ============================================================================
// Tests
// ============================================================================
