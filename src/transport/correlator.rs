//! Nonce correlation for requests expecting a `RESPONSE`.
//!
//! Each pending request owns a one-shot channel keyed by its nonce. The
//! entry is consumed exactly once: by the matching response, by a
//! timeout, or by connection teardown.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::Nonce;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
pub const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Map of nonces to response channels.
type CorrelationMap = FxHashMap<Nonce, oneshot::Sender<Result<()>>>;

// ============================================================================
// Correlator
// ============================================================================

/// Pending nonced requests.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<CorrelationMap>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request and returns the receiving end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if too many requests are pending.
    pub fn register(&self, nonce: Nonce) -> Result<oneshot::Receiver<Result<()>>> {
        let mut pending = self.pending.lock();

        if pending.len() >= MAX_PENDING_REQUESTS {
            warn!(
                pending = pending.len(),
                max = MAX_PENDING_REQUESTS,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                pending.len(),
                MAX_PENDING_REQUESTS
            )));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(nonce, tx);
        Ok(rx)
    }

    /// Resolves the request matching `nonce`.
    ///
    /// An empty or absent `error` resolves successfully, anything else
    /// rejects with [`Error::Request`]. Returns `false` if no request
    /// with that nonce is pending.
    pub fn resolve(&self, nonce: &Nonce, error: Option<&str>) -> bool {
        let Some(tx) = self.pending.lock().remove(nonce) else {
            warn!(%nonce, "Response for unknown request");
            return false;
        };

        let outcome = match error {
            Some(message) if !message.is_empty() => Err(Error::request(message)),
            _ => Ok(()),
        };

        trace!(%nonce, ok = outcome.is_ok(), "Request resolved");
        let _ = tx.send(outcome);
        true
    }

    /// Rejects the request matching `nonce` with `error`.
    pub fn reject(&self, nonce: &Nonce, error: Error) {
        if let Some(tx) = self.pending.lock().remove(nonce) {
            let _ = tx.send(Err(error));
        }
    }

    /// Drops the entry for `nonce` without notifying anyone.
    pub fn forget(&self, nonce: &Nonce) {
        if self.pending.lock().remove(nonce).is_some() {
            debug!(%nonce, "Removed timed-out correlation");
        }
    }

    /// Fails all pending requests with [`Error::ConnectionClosed`].
    pub fn fail_all(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on teardown");
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
