//! Subscription and commerce payloads.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// MessageText
// ============================================================================

/// User-supplied text with emote positions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageText {
    /// Raw text.
    pub message: String,
    /// Emote ranges within `message`.
    pub emotes: Vec<EmoteRange>,
}

/// Position of one emote inside a [`MessageText`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmoteRange {
    /// First character index.
    pub start: usize,
    /// Last character index (inclusive).
    pub end: usize,
    /// Emote ID. The service sends both numbers and strings here.
    pub id: Value,
}

impl EmoteRange {
    /// Emote ID rendered as a string.
    #[must_use]
    pub fn emote_id(&self) -> String {
        match &self.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// SubscriptionMessage
// ============================================================================

/// A subscription event (`channel-subscribe-events-v1`).
///
/// Covers first-time subs, resubs and gifted subs. For gifts, the
/// subscriber is the recipient and the sending user is the gifter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubscriptionMessage {
    user_id: Option<String>,
    user_name: Option<String>,
    display_name: Option<String>,
    channel_id: String,
    channel_name: String,
    time: String,
    sub_plan: String,
    sub_plan_name: String,
    cumulative_months: Option<u32>,
    streak_months: Option<u32>,
    months: Option<u32>,
    context: String,
    is_gift: bool,
    sub_message: Option<MessageText>,
    recipient_id: Option<String>,
    recipient_user_name: Option<String>,
    recipient_display_name: Option<String>,
}

impl SubscriptionMessage {
    /// ID of the user who now has the subscription.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        if self.is_gift {
            self.recipient_id.as_deref()
        } else {
            self.user_id.as_deref()
        }
    }

    /// Login of the user who now has the subscription.
    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        if self.is_gift {
            self.recipient_user_name.as_deref()
        } else {
            self.user_name.as_deref()
        }
    }

    /// Display name of the user who now has the subscription.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        if self.is_gift {
            self.recipient_display_name.as_deref()
        } else {
            self.display_name.as_deref()
        }
    }

    /// ID of the gifting user, `None` for non-gift or anonymous gifts.
    #[must_use]
    pub fn gifter_id(&self) -> Option<&str> {
        if self.is_gift {
            self.user_id.as_deref()
        } else {
            None
        }
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

    #[inline]
    #[must_use]
    pub fn time(&self) -> &str {
        &self.time
    }

    /// Plan ID: `Prime`, `1000`, `2000` or `3000`.
    #[inline]
    #[must_use]
    pub fn sub_plan(&self) -> &str {
        &self.sub_plan
    }

    #[inline]
    #[must_use]
    pub fn sub_plan_name(&self) -> &str {
        &self.sub_plan_name
    }

    #[inline]
    #[must_use]
    pub fn is_gift(&self) -> bool {
        self.is_gift
    }

    /// Returns `true` for a resubscription.
    #[inline]
    #[must_use]
    pub fn is_resub(&self) -> bool {
        self.context == "resub"
    }

    /// Total months subscribed, falling back to the legacy `months` field.
    #[inline]
    #[must_use]
    pub fn months(&self) -> u32 {
        self.cumulative_months.or(self.months).unwrap_or_default()
    }

    /// Consecutive months, if the user chose to share it.
    #[inline]
    #[must_use]
    pub fn streak_months(&self) -> Option<u32> {
        self.streak_months
    }

    /// Message attached to the subscription, if any.
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&MessageText> {
        self.sub_message.as_ref()
    }
}

// ============================================================================
// CommerceMessage
// ============================================================================

/// A commerce purchase (`channel-commerce-events-v1`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommerceMessage {
    user_id: String,
    user_name: String,
    display_name: String,
    channel_id: String,
    channel_name: String,
    time: String,
    item_image_url: String,
    item_description: String,
    supports_channel: bool,
    purchase_message: Option<MessageText>,
}

impl CommerceMessage {
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
    pub fn display_name(&self) -> &str {
        &self.display_name
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

    #[inline]
    #[must_use]
    pub fn time(&self) -> &str {
        &self.time
    }

    #[inline]
    #[must_use]
    pub fn item_image_url(&self) -> &str {
        &self.item_image_url
    }

    #[inline]
    #[must_use]
    pub fn item_description(&self) -> &str {
        &self.item_description
    }

    /// Returns `true` if the purchase supports the channel.
    #[inline]
    #[must_use]
    pub fn supports_channel(&self) -> bool {
        self.supports_channel
    }

    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&MessageText> {
        self.purchase_message.as_ref()
    }
}

// ============================================================================
// Tests
// ============================================================================
