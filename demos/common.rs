//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line and environment parsing
//! - Logging initialization
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the user ID to listen as.
pub const USER_ID_VAR: &str = "TWITCH_USER_ID";

/// Environment variable holding that user's OAuth token.
pub const TOKEN_VAR: &str = "TWITCH_TOKEN";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    pub endpoint: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            endpoint: args
                .iter()
                .position(|a| a == "--endpoint")
                .and_then(|i| args.get(i + 1).cloned()),
        }
    }
}

/// Credentials read from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

impl Credentials {
    /// Reads credentials, or `None` if either variable is unset.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            user_id: std::env::var(USER_ID_VAR).ok()?,
            token: std::env::var(TOKEN_VAR).ok()?,
        })
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "twitch_pubsub=debug"
    } else {
        "twitch_pubsub=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
