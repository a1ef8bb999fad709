//! Topic routing.
//!
//! Maps an incoming topic `<type>.<userId>` to the registry of that user
//! and hands the payload over for typed dispatch.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::identifiers::UserId;
use crate::protocol::{TopicKind, split_topic};

use super::registry::IdentityRegistry;

// ============================================================================
// TopicRouter
// ============================================================================

/// Identity map shared by the façade and the connection event handler.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    registries: Arc<RwLock<FxHashMap<UserId, IdentityRegistry>>>,
}

impl TopicRouter {
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a registry, returning the one it replaced.
    pub fn insert(&self, registry: IdentityRegistry) -> Option<IdentityRegistry> {
        self.registries
            .write()
            .insert(registry.user_id().clone(), registry)
    }

    /// Looks up the registry for `user_id`.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<IdentityRegistry> {
        self.registries.read().get(user_id).cloned()
    }

    /// Returns all registered user IDs.
    #[must_use]
    pub fn user_ids(&self) -> Vec<UserId> {
        self.registries.read().keys().cloned().collect()
    }

    /// Returns all registries.
    #[must_use]
    pub fn registries(&self) -> Vec<IdentityRegistry> {
        self.registries.read().values().cloned().collect()
    }

    /// Routes one message to the listeners of its topic.
    ///
    /// Returns `false` if the topic is malformed, of an unknown type, for
    /// an unregistered user, or has no listeners.
    pub fn dispatch(&self, topic: &str, payload: Value) -> bool {
        let Some((type_name, user)) = split_topic(topic) else {
            warn!(topic, "Malformed topic");
            return false;
        };

        let Some(kind) = TopicKind::from_name(type_name) else {
            debug!(topic, "Message for unknown topic type dropped");
            return false;
        };

        let Some(registry) = self.get(&UserId::from(user)) else {
            debug!(topic, "Message for unregistered user dropped");
            return false;
        };

        registry.dispatch(kind, payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
