//! Per-identity listener registry.
//!
//! Each registered user gets one [`IdentityRegistry`]. It keeps the
//! listeners for every topic kind in insertion order and keeps the
//! service-side subscription in sync:
//!
//! - First listener for a kind → one `LISTEN`
//! - Further listeners → appended, nothing sent
//! - Last listener removed → one `UNLISTEN` (best effort)

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::{ListenerId, UserId};
use crate::messages::PubSubMessage;
use crate::protocol::{ListenData, NoncedRequest, TopicKind};
use crate::transport::Connection;

use super::auth::{AuthProvider, resolve_token};

// ============================================================================
// Types
// ============================================================================

/// Listener callback receiving the decoded message.
pub type Callback = Arc<dyn Fn(&PubSubMessage, &ApiContext) + Send + Sync>;

// ============================================================================
// ApiContext
// ============================================================================

/// Identity context handed to every callback.
///
/// Lets a callback make follow-up API calls as the listening user.
#[derive(Clone)]
pub struct ApiContext {
    user_id: UserId,
    auth: Arc<dyn AuthProvider>,
}

impl ApiContext {
    /// User the message was delivered for.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Token provider of that user.
    #[inline]
    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Internal State
// ============================================================================

struct ListenerEntry {
    id: ListenerId,
    callback: Callback,
}

/// Listeners sharing one service-side subscription.
struct TopicListeners {
    /// Scope the subscription's token was resolved with.
    scope: Option<String>,
    /// Callbacks in registration order.
    entries: Vec<ListenerEntry>,
}

struct RegistryInner {
    context: ApiContext,
    connection: Connection,
    listeners: Mutex<FxHashMap<TopicKind, TopicListeners>>,
    /// Serializes LISTEN/UNLISTEN transitions so they reach the wire in order.
    subscription_lock: tokio::sync::Mutex<()>,
}

// ============================================================================
// IdentityRegistry
// ============================================================================

/// Listener registry bound to one user and the shared connection.
#[derive(Clone)]
pub struct IdentityRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("user_id", &self.inner.context.user_id)
            .field("topics", &self.inner.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

impl IdentityRegistry {
    /// Creates an empty registry for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, auth: Arc<dyn AuthProvider>, connection: Connection) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                context: ApiContext { user_id, auth },
                connection,
                listeners: Mutex::new(FxHashMap::default()),
                subscription_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns the user this registry belongs to.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.inner.context.user_id
    }

    /// Returns the number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: TopicKind) -> usize {
        self.inner
            .listeners
            .lock()
            .get(&kind)
            .map_or(0, |topic| topic.entries.len())
    }

    /// Returns the topics currently subscribed for this user.
    #[must_use]
    pub fn active_topics(&self) -> Vec<String> {
        self.inner
            .listeners
            .lock()
            .keys()
            .map(|kind| kind.topic(self.user_id()))
            .collect()
    }

    /// Adds a listener for `kind`.
    ///
    /// Connects if needed and resolves a token for `scope`. The first
    /// listener for a kind is only registered once the service has
    /// acknowledged the `LISTEN`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`](crate::Error::Connection) if the first connection fails
    /// - [`Error::Authentication`](crate::Error::Authentication) if no valid token is available
    /// - [`Error::Request`](crate::Error::Request) if the service rejects the `LISTEN`
    /// - [`Error::RequestTimeout`](crate::Error::RequestTimeout) if the `LISTEN` is not answered
    pub async fn add_listener(
        &self,
        kind: TopicKind,
        scope: Option<&str>,
        callback: Callback,
    ) -> Result<Listener> {
        self.inner.connection.connect().await?;
        let token = resolve_token(self.inner.context.auth.as_ref(), scope).await?;

        let entry = ListenerEntry {
            id: ListenerId::next(),
            callback,
        };
        let listener = Listener {
            id: entry.id,
            kind,
            registry: self.clone(),
        };

        let _guard = self.inner.subscription_lock.lock().await;

        {
            let mut listeners = self.inner.listeners.lock();
            if let Some(topic) = listeners.get_mut(&kind) {
                topic.entries.push(entry);
                debug!(
                    user_id = %self.user_id(),
                    %kind,
                    listeners = topic.entries.len(),
                    "Listener appended"
                );
                return Ok(listener);
            }
        }

        let topic = kind.topic(self.user_id());
        debug!(topic = %topic, "Subscribing");

        self.inner
            .connection
            .send_nonced(NoncedRequest::Listen(ListenData::single(
                topic.clone(),
                Some(token),
            )))
            .await?;

        self.inner.listeners.lock().insert(
            kind,
            TopicListeners {
                scope: scope.map(str::to_string),
                entries: vec![entry],
            },
        );

        info!(topic = %topic, listener_id = %listener.id, "Subscribed");
        Ok(listener)
    }

    /// Removes a listener.
    ///
    /// Removal takes effect locally at once. If it was the last listener
    /// for its kind, an `UNLISTEN` is sent in the background; the returned
    /// handle yields its outcome and may simply be dropped. Failures are
    /// logged.
    pub fn remove_listener(&self, listener: &Listener) -> Option<JoinHandle<Result<()>>> {
        let scope = {
            let mut listeners = self.inner.listeners.lock();
            let topic = listeners.get_mut(&listener.kind)?;

            let before = topic.entries.len();
            topic.entries.retain(|entry| entry.id != listener.id);
            if topic.entries.len() == before {
                trace!(listener_id = %listener.id, "Listener already removed");
                return None;
            }

            debug!(
                user_id = %self.user_id(),
                kind = %listener.kind,
                remaining = topic.entries.len(),
                "Listener removed"
            );

            if !topic.entries.is_empty() {
                return None;
            }
            listeners.remove(&listener.kind)?.scope
        };

        let registry = self.clone();
        let kind = listener.kind;
        Some(tokio::spawn(async move {
            registry.unlisten(kind, scope.as_deref()).await
        }))
    }

    /// Sends the `UNLISTEN` for `kind` unless it was re-subscribed meanwhile.
    async fn unlisten(&self, kind: TopicKind, scope: Option<&str>) -> Result<()> {
        let _guard = self.inner.subscription_lock.lock().await;

        if self.inner.listeners.lock().contains_key(&kind) {
            debug!(%kind, "Topic re-subscribed before UNLISTEN, skipping");
            return Ok(());
        }

        let topic = kind.topic(self.user_id());
        let token = resolve_token(self.inner.context.auth.as_ref(), scope)
            .await
            .ok();

        let result = self
            .inner
            .connection
            .send_nonced(NoncedRequest::Unlisten(ListenData::single(
                topic.clone(),
                token,
            )))
            .await;

        match &result {
            Ok(()) => info!(topic = %topic, "Unsubscribed"),
            Err(e) => warn!(topic = %topic, error = %e, "UNLISTEN failed"),
        }
        result
    }

    /// Re-sends one `LISTEN` per active topic after a reconnect.
    ///
    /// Best effort: failures are logged and the local listeners stay.
    pub async fn resubscribe(&self) {
        let _guard = self.inner.subscription_lock.lock().await;

        let topics: Vec<(TopicKind, Option<String>)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(kind, topic)| (*kind, topic.scope.clone()))
            .collect();

        for (kind, scope) in topics {
            let topic = kind.topic(self.user_id());

            let token = match resolve_token(self.inner.context.auth.as_ref(), scope.as_deref()).await
            {
                Ok(token) => token,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Cannot resolve token for resubscription");
                    continue;
                }
            };

            match self
                .inner
                .connection
                .send_nonced(NoncedRequest::Listen(ListenData::single(
                    topic.clone(),
                    Some(token),
                )))
                .await
            {
                Ok(()) => debug!(topic = %topic, "Resubscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "Resubscription failed"),
            }
        }
    }

    /// Delivers a payload to every listener for `kind`, in registration order.
    ///
    /// Returns `false` if nothing was delivered.
    pub fn dispatch(&self, kind: TopicKind, payload: Value) -> bool {
        let callbacks: Vec<Callback> = {
            let listeners = self.inner.listeners.lock();
            let Some(topic) = listeners.get(&kind) else {
                trace!(user_id = %self.user_id(), %kind, "No listeners, message dropped");
                return false;
            };
            topic
                .entries
                .iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };

        let message = match PubSubMessage::decode(kind, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(user_id = %self.user_id(), error = %e, "Failed to decode message");
                return false;
            }
        };

        for callback in &callbacks {
            callback(&message, &self.inner.context);
        }
        true
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Handle to one registered callback.
///
/// Dropping the handle does not remove the listener; call
/// [`remove`](Self::remove).
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    kind: TopicKind,
    registry: IdentityRegistry,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("user_id", self.user_id())
            .finish()
    }
}

impl Listener {
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> TopicKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        self.registry.user_id()
    }

    /// Full topic name this listener is bound to.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> String {
        self.kind.topic(self.user_id())
    }

    /// Removes this listener from its registry.
    ///
    /// See [`IdentityRegistry::remove_listener`].
    pub fn remove(&self) -> Option<JoinHandle<Result<()>>> {
        self.registry.remove_listener(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
