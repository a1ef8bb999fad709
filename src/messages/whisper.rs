//! Whisper payloads.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

// ============================================================================
// WhisperMessage
// ============================================================================

/// A whisper received by the user (`whispers`).
///
/// The service nests the structured body under `data_object`; the
/// duplicate string-encoded `data` field is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WhisperMessage {
    #[serde(rename = "type")]
    whisper_type: String,
    data_object: WhisperData,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct WhisperData {
    id: u64,
    message_id: String,
    thread_id: String,
    body: String,
    sent_ts: u64,
    from_id: u64,
    tags: WhisperTags,
    recipient: WhisperRecipient,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct WhisperTags {
    login: String,
    display_name: String,
    color: String,
    badges: Vec<WhisperBadge>,
}

/// A chat badge shown next to a whisper sender or recipient.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WhisperBadge {
    /// Badge set ID.
    pub id: String,
    /// Badge version within the set.
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct WhisperRecipient {
    id: u64,
    username: String,
    display_name: String,
    color: String,
}

impl WhisperMessage {
    /// Whisper event type, e.g. `whisper_received`.
    #[inline]
    #[must_use]
    pub fn whisper_type(&self) -> &str {
        &self.whisper_type
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.data_object.id
    }

    #[inline]
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.data_object.message_id
    }

    /// Conversation thread, `<lowerId>_<higherId>`.
    #[inline]
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.data_object.thread_id
    }

    /// Whisper text.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.data_object.body
    }

    /// Unix timestamp (seconds) the whisper was sent at.
    #[inline]
    #[must_use]
    pub fn sent_at(&self) -> u64 {
        self.data_object.sent_ts
    }

    #[inline]
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        self.data_object.from_id
    }

    #[inline]
    #[must_use]
    pub fn sender_login(&self) -> &str {
        &self.data_object.tags.login
    }

    #[inline]
    #[must_use]
    pub fn sender_display_name(&self) -> &str {
        &self.data_object.tags.display_name
    }

    /// Sender's chat color as `#RRGGBB`, empty if unset.
    #[inline]
    #[must_use]
    pub fn sender_color(&self) -> &str {
        &self.data_object.tags.color
    }

    #[inline]
    #[must_use]
    pub fn sender_badges(&self) -> &[WhisperBadge] {
        &self.data_object.tags.badges
    }

    #[inline]
    #[must_use]
    pub fn recipient_id(&self) -> u64 {
        self.data_object.recipient.id
    }

    #[inline]
    #[must_use]
    pub fn recipient_login(&self) -> &str {
        &self.data_object.recipient.username
    }
}

// ============================================================================
// Tests
// ============================================================================
