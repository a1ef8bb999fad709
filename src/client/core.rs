//! Multi-identity PubSub client.
//!
//! The [`PubSubClient`] maps user IDs to their listener registries, all
//! sharing one [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use twitch_pubsub::{PubSubClient, StaticAuthProvider};
//!
//! # async fn example() -> twitch_pubsub::Result<()> {
//! let client = PubSubClient::new()?;
//! let user_id = client
//!     .register_identity(Arc::new(StaticAuthProvider::new("42", "token")))
//!     .await?;
//!
//! client
//!     .on_bits(&user_id, |message, _ctx| {
//!         let user = message.user_name().unwrap_or("anonymous");
//!         println!("{user} cheered {} bits", message.bits());
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::UserId;
use crate::messages::{
    BitsBadgeUnlockMessage, BitsMessage, CommerceMessage, PubSubMessage, SubscriptionMessage,
    WhisperMessage,
};
use crate::protocol::TopicKind;
use crate::transport::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};

use super::auth::{AuthProvider, resolve_token};
use super::builder::PubSubClientBuilder;
use super::registry::{ApiContext, Callback, IdentityRegistry, Listener};
use super::router::TopicRouter;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// The one connection shared by every identity.
    connection: Connection,

    /// Identity map.
    router: TopicRouter,
}

// ============================================================================
// PubSubClient
// ============================================================================

/// PubSub client serving any number of user identities.
///
/// Cloning is cheap; clones share the connection and the identity map.
#[derive(Clone)]
pub struct PubSubClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubClient")
            .field("state", &self.connection_state())
            .field("identities", &self.registered_users().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PubSubClient - Construction
// ============================================================================

impl PubSubClient {
    /// Creates a client with the default configuration.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the default configuration is invalid.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> PubSubClientBuilder {
        PubSubClientBuilder::new()
    }

    /// Spawns the connection driver and wires its events to the router.
    pub(crate) fn from_config(config: ConnectionConfig) -> Self {
        let inner = Arc::new(ClientInner {
            connection: Connection::new(config),
            router: TopicRouter::new(),
        });

        // The driver owns the handler, so it must not keep the client alive.
        let weak: Weak<ClientInner> = Arc::downgrade(&inner);
        inner
            .connection
            .set_event_handler(Box::new(move |event: ConnectionEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_event(event);
                }
            }));

        Self { inner }
    }
}

impl ClientInner {
    /// Reacts to a connection event. Runs on the driver task.
    fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message { topic, payload } => {
                self.router.dispatch(&topic, payload);
            }

            ConnectionEvent::Opened { reconnect: true } => {
                let registries = self.router.registries();
                info!(identities = registries.len(), "Reconnected, resubscribing");
                for registry in registries {
                    tokio::spawn(async move { registry.resubscribe().await });
                }
            }

            ConnectionEvent::Opened { reconnect: false } => {
                debug!("Connected");
            }

            ConnectionEvent::Closed { was_clean, manual } => {
                debug!(was_clean, manual, "Disconnected");
            }
        }
    }
}

// ============================================================================
// PubSubClient - Identities
// ============================================================================

impl PubSubClient {
    /// Registers an identity and returns its user ID.
    ///
    /// Re-registering a user replaces its registry; listeners of the
    /// previous registry stop receiving messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the provider has no valid token.
    pub async fn register_identity(&self, auth: Arc<dyn AuthProvider>) -> Result<UserId> {
        resolve_token(auth.as_ref(), None).await?;
        let user_id = auth.token_info().await?.user_id;

        let registry =
            IdentityRegistry::new(user_id.clone(), auth, self.inner.connection.clone());

        if self.inner.router.insert(registry).is_some() {
            warn!(user_id = %user_id, "Identity re-registered, previous listeners dropped");
        } else {
            info!(user_id = %user_id, "Identity registered");
        }

        Ok(user_id)
    }

    /// Returns the registry of a registered user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredIdentity`] if the user was never registered.
    pub fn registry(&self, user_id: &UserId) -> Result<IdentityRegistry> {
        self.inner
            .router
            .get(user_id)
            .ok_or_else(|| Error::unregistered_identity(user_id.clone()))
    }

    /// Returns the IDs of all registered users.
    #[must_use]
    pub fn registered_users(&self) -> Vec<UserId> {
        self.inner.router.user_ids()
    }
}

// ============================================================================
// PubSubClient - Listeners
// ============================================================================

impl PubSubClient {
    /// Listens for Bits cheers in the channel of `user_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnregisteredIdentity`] if the user was never registered
    /// - Any error of [`IdentityRegistry::add_listener`]
    pub async fn on_bits<F>(&self, user_id: &UserId, callback: F) -> Result<Listener>
    where
        F: Fn(&BitsMessage, &ApiContext) + Send + Sync + 'static,
    {
        let callback = erase(move |message, ctx| {
            if let PubSubMessage::Bits(message) = message {
                callback(message, ctx);
            }
        });
        self.listen(user_id, TopicKind::Bits, callback).await
    }

    /// Listens for Bits badge unlocks in the channel of `user_id`.
    ///
    /// # Errors
    ///
    /// Same as [`on_bits`](Self::on_bits).
    pub async fn on_bits_badge_unlock<F>(&self, user_id: &UserId, callback: F) -> Result<Listener>
    where
        F: Fn(&BitsBadgeUnlockMessage, &ApiContext) + Send + Sync + 'static,
    {
        let callback = erase(move |message, ctx| {
            if let PubSubMessage::BitsBadgeUnlock(message) = message {
                callback(message, ctx);
            }
        });
        self.listen(user_id, TopicKind::BitsBadgeUnlocks, callback)
            .await
    }

    /// Listens for subscriptions to the channel of `user_id`.
    ///
    /// Requires the `channel_subscriptions` scope.
    ///
    /// # Errors
    ///
    /// Same as [`on_bits`](Self::on_bits).
    pub async fn on_subscription<F>(&self, user_id: &UserId, callback: F) -> Result<Listener>
    where
        F: Fn(&SubscriptionMessage, &ApiContext) + Send + Sync + 'static,
    {
        let callback = erase(move |message, ctx| {
            if let PubSubMessage::Subscription(message) = message {
                callback(message, ctx);
            }
        });
        self.listen(user_id, TopicKind::Subscriptions, callback)
            .await
    }

    /// Listens for commerce purchases in the channel of `user_id`.
    ///
    /// # Errors
    ///
    /// Same as [`on_bits`](Self::on_bits).
    pub async fn on_commerce<F>(&self, user_id: &UserId, callback: F) -> Result<Listener>
    where
        F: Fn(&CommerceMessage, &ApiContext) + Send + Sync + 'static,
    {
        let callback = erase(move |message, ctx| {
            if let PubSubMessage::Commerce(message) = message {
                callback(message, ctx);
            }
        });
        self.listen(user_id, TopicKind::Commerce, callback).await
    }

    /// Listens for whispers sent to `user_id`.
    ///
    /// Requires the `whispers:read` scope.
    ///
    /// # Errors
    ///
    /// Same as [`on_bits`](Self::on_bits).
    pub async fn on_whisper<F>(&self, user_id: &UserId, callback: F) -> Result<Listener>
    where
        F: Fn(&WhisperMessage, &ApiContext) + Send + Sync + 'static,
    {
        let callback = erase(move |message, ctx| {
            if let PubSubMessage::Whisper(message) = message {
                callback(message, ctx);
            }
        });
        self.listen(user_id, TopicKind::Whispers, callback).await
    }

    async fn listen(
        &self,
        user_id: &UserId,
        kind: TopicKind,
        callback: Callback,
    ) -> Result<Listener> {
        let registry = self.registry(user_id)?;
        registry
            .add_listener(kind, kind.required_scope(), callback)
            .await
    }
}

/// Boxes a callback over the decoded message enum.
fn erase(callback: impl Fn(&PubSubMessage, &ApiContext) + Send + Sync + 'static) -> Callback {
    Arc::new(callback)
}

// ============================================================================
// PubSubClient - Connection
// ============================================================================

impl PubSubClient {
    /// Opens the shared connection ahead of the first listener.
    ///
    /// # Errors
    ///
    /// See [`Connection::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.inner.connection.connect().await
    }

    /// Closes the shared connection without reconnecting.
    ///
    /// Registries keep their listeners. The next [`connect`](Self::connect)
    /// or listener added reopens the connection as a reconnect, which
    /// sends a fresh `LISTEN` for every active topic of every identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the driver is gone.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.connection.close().await
    }

    /// Drops the socket and reconnects at once, resubscribing every topic.
    pub fn reconnect(&self) {
        self.inner.connection.reconnect();
    }

    /// Returns the shared connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Returns the state of the shared connection.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::client::auth::{StaticAuthProvider, TokenInfo};

    struct InvalidProvider;

    #[async_trait]
    impl AuthProvider for InvalidProvider {
        async fn access_token(&self, _scope: Option<&str>) -> Result<String> {
            Ok("expired".to_string())
        }

        async fn token_info(&self) -> Result<TokenInfo> {
            Ok(TokenInfo {
                valid: false,
                user_id: UserId::from("7"),
            })
        }

        async fn refresh(&self) -> Result<String> {
            Err(Error::authentication("refresh token revoked"))
        }
    }

    #[tokio::test]
    async fn test_register_identity() {
        let client = PubSubClient::new().expect("client");
        let user_id = client
            .register_identity(Arc::new(StaticAuthProvider::new("42", "token")))
            .await
            .expect("register");

        assert_eq!(user_id.as_str(), "42");
        assert_eq!(client.registered_users(), vec![UserId::from("42")]);
        assert!(client.registry(&user_id).is_ok());
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_register_invalid_identity_fails() {
        let client = PubSubClient::new().expect("client");
        let result = client.register_identity(Arc::new(InvalidProvider)).await;

        assert!(matches!(result, Err(Error::Authentication { .. })));
        assert!(client.registered_users().is_empty());
    }

    #[tokio::test]
    async fn test_listen_on_unregistered_identity() {
        let client = PubSubClient::new().expect("client");
        let result = client.on_whisper(&UserId::from("99"), |_, _| {}).await;

        match result {
            Err(Error::UnregisteredIdentity { user_id }) => assert_eq!(user_id.as_str(), "99"),
            other => panic!("expected UnregisteredIdentity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_does_not_keep_client_alive() {
        let client = PubSubClient::new().expect("client");
        let weak = Arc::downgrade(&client.inner);
        drop(client);
        assert!(weak.upgrade().is_none());
    }
}
