//! Twitch PubSub - Multi-identity client for the PubSub WebSocket service.
//!
//! This library subscribes to per-user topics (Bits, subscriptions,
//! commerce, whispers) and delivers typed messages to registered
//! callbacks, keeping one shared connection healthy in the background.
//!
//! # Architecture
//!
//! - **Connection driver**: one Tokio task owns the socket, the liveness
//!   timers and the reconnect backoff
//! - **Correlator**: matches `RESPONSE` packets to pending `LISTEN`/`UNLISTEN`
//!   requests by nonce
//! - **Identity registries**: one per user, sending `LISTEN` for the first
//!   listener of a topic and `UNLISTEN` after the last one
//!
//! Key design principles:
//!
//! - All identities share a single connection
//! - Topics are named `<type>.<userId>`
//! - Callbacks for a topic fire in registration order, never in parallel
//! - Topics are resubscribed after every reconnect
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use twitch_pubsub::{PubSubClient, Result, StaticAuthProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = PubSubClient::new()?;
//!
//!     let auth = StaticAuthProvider::new("42", "oauth-token")
//!         .with_scopes(["channel_subscriptions", "whispers:read"]);
//!     let user_id = client.register_identity(Arc::new(auth)).await?;
//!
//!     let listener = client
//!         .on_subscription(&user_id, |message, _ctx| {
//!             println!("{:?} subscribed", message.display_name());
//!         })
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     listener.remove();
//!     client.disconnect().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`PubSubClient`], identity registries, listeners |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`messages`] | Typed topic payloads |
//! | [`protocol`] | Wire packets and topic names |
//! | [`transport`] | Connection driver, correlation, backoff |

// ============================================================================
// Modules
// ============================================================================

/// Multi-identity client façade.
///
/// Use [`PubSubClient::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing user IDs, nonces and listener IDs.
pub mod identifiers;

/// Typed topic payloads.
pub mod messages;

/// WebSocket protocol message types.
///
/// Outgoing and incoming packet envelopes and topic naming.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection driver, nonce correlation and reconnect backoff.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ApiContext, AuthProvider, IdentityRegistry, Listener, PubSubClient, PubSubClientBuilder,
    StaticAuthProvider, TokenInfo,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, Nonce, UserId};

// Message types
pub use messages::{
    BitsBadgeUnlockMessage, BitsMessage, CommerceMessage, PubSubMessage, SubscriptionMessage,
    WhisperMessage,
};

// Protocol types
pub use protocol::TopicKind;

// Transport types
pub use transport::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};
