//! PubSub wire protocol.
//!
//! This module defines the envelope format exchanged with the service
//! and the topic naming convention.
//!
//! # Protocol Overview
//!
//! | Packet | Direction | Purpose |
//! |--------|-----------|---------|
//! | `LISTEN` | Local → Service | Subscribe topics (nonced) |
//! | `UNLISTEN` | Local → Service | Unsubscribe topics (nonced) |
//! | `PING` | Local → Service | Liveness probe |
//! | `PONG` | Service → Local | Probe answer |
//! | `RESPONSE` | Service → Local | Answer to a nonced request |
//! | `MESSAGE` | Service → Local | Topic message with encoded payload |
//! | `RECONNECT` | Service → Local | Service asks for a reconnect |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `packet` | Outgoing and incoming envelopes |
//! | `topic` | Event types and `<type>.<userId>` topics |

// ============================================================================
// Submodules
// ============================================================================

/// Outgoing and incoming envelopes.
pub mod packet;

/// Event types and topic naming.
pub mod topic;

// ============================================================================
// Re-exports
// ============================================================================

pub use packet::{IncomingPacket, ListenData, MessageData, NoncedRequest, OutgoingPacket};
pub use topic::{TopicKind, split_topic};
