//! PubSub client façade.
//!
//! This module ties identities, listeners and the shared connection
//! together.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PubSubClient`] | Multi-identity entry point |
//! | [`PubSubClientBuilder`] | Fluent configuration builder |
//! | [`IdentityRegistry`] | Listeners of one user, synced with the service |
//! | [`Listener`] | Handle to one registered callback |
//! | [`TopicRouter`] | Topic → identity dispatch |
//! | [`AuthProvider`] | Token collaborator implemented by the caller |
//!
//! # Message Flow
//!
//! ```text
//! socket ─► Connection driver ─► TopicRouter ─► IdentityRegistry ─► callbacks
//!                                  (user id)       (topic kind)     (in order)
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Token provider trait and token resolution.
pub mod auth;

/// Fluent builder for client configuration.
pub mod builder;

/// Multi-identity client.
pub mod core;

/// Per-identity listener registry.
pub mod registry;

/// Topic routing.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::{AuthProvider, StaticAuthProvider, TokenInfo, resolve_token};
pub use builder::PubSubClientBuilder;
pub use self::core::PubSubClient;
pub use registry::{ApiContext, Callback, IdentityRegistry, Listener};
pub use router::TopicRouter;
