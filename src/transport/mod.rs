//! WebSocket transport layer.
//!
//! This module handles the single persistent connection to the PubSub
//! service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                       ┌─────────────────┐
//! │  Connection handles  │                       │  PubSub service │
//! │          │           │       WebSocket       │                 │
//! │          ▼           │◄─────────────────────►│                 │
//! │  Driver task         │   JSON text frames    │                 │
//! │  (socket, timers,    │                       │                 │
//! │   backoff, state)    │                       │                 │
//! └──────────────────────┘                       └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::new` - Spawn the driver, no socket yet
//! 2. `Connection::connect` - Open the socket (idempotent)
//! 3. `Connection::send_nonced` - LISTEN/UNLISTEN round trips
//! 4. Driver pings every interval, reconnects on missing PONG or RECONNECT
//! 5. `Connection::close` - Manual disconnect, no reconnect
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Fibonacci reconnect delays |
//! | `config` | Endpoint, intervals and timeouts |
//! | `connection` | Connection handle and driver task |
//! | `correlator` | Nonce → pending request map |

// ============================================================================
// Submodules
// ============================================================================

/// Fibonacci reconnect delays.
pub mod backoff;

/// Connection settings.
pub mod config;

/// Connection handle and driver task.
pub mod connection;

/// Nonce correlation.
pub mod correlator;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{Backoff, delay_for_attempt};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionState, EventHandler};
pub use correlator::Correlator;
