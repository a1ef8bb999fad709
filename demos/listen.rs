//! Listen to every topic of one channel.
//!
//! Demonstrates:
//! - Building a client and registering an identity
//! - Typed listeners for Bits, subscriptions, commerce and whispers
//! - Removing listeners and disconnecting
//!
//! Usage:
//!   TWITCH_USER_ID=42 TWITCH_TOKEN=... cargo run --example listen
//!   cargo run --example listen -- --debug
//!   cargo run --example listen -- --no-wait
//!   cargo run --example listen -- --endpoint ws://127.0.0.1:9000

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use common::{Args, Credentials, TOKEN_VAR, USER_ID_VAR};
use twitch_pubsub::{PubSubClient, Result, StaticAuthProvider};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    let Some(credentials) = Credentials::from_env() else {
        eprintln!("[ERROR] Set {USER_ID_VAR} and {TOKEN_VAR}");
        std::process::exit(2);
    };

    if let Err(e) = run(args, credentials).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args, credentials: Credentials) -> Result<()> {
    println!("=== PubSub Listen ===\n");

    // ========================================================================
    // Create Client
    // ========================================================================

    println!("[1] Creating client...");

    let mut builder = PubSubClient::builder();
    if let Some(endpoint) = &args.endpoint {
        println!("    Endpoint: {endpoint}");
        builder = builder.endpoint(endpoint.clone());
    }
    let client = builder.build()?;

    println!("    ✓ Client ready\n");

    // ========================================================================
    // Register Identity
    // ========================================================================

    println!("[2] Registering identity...");

    let auth = StaticAuthProvider::new(credentials.user_id, credentials.token)
        .with_scopes(["channel_subscriptions", "whispers:read"]);
    let user_id = client.register_identity(Arc::new(auth)).await?;

    println!("    ✓ Registered user {user_id}\n");

    // ========================================================================
    // Listen
    // ========================================================================

    println!("[3] Adding listeners...");

    let mut listeners = Vec::new();

    listeners.push(
        client
            .on_bits(&user_id, |message, _ctx| {
                println!(
                    "    [bits] {} cheered {} ({} total)",
                    message.user_name().unwrap_or("anonymous"),
                    message.bits(),
                    message.total_bits()
                );
            })
            .await?,
    );

    listeners.push(
        client
            .on_bits_badge_unlock(&user_id, |message, _ctx| {
                println!(
                    "    [badge] {} unlocked tier {}",
                    message.user_name(),
                    message.badge_tier()
                );
            })
            .await?,
    );

    listeners.push(
        client
            .on_commerce(&user_id, |message, _ctx| {
                println!(
                    "    [commerce] {} bought {}",
                    message.display_name(),
                    message.item_description()
                );
            })
            .await?,
    );

    // Scoped topics are optional; a token without the scope just skips them.
    match client
        .on_subscription(&user_id, |message, _ctx| {
            println!(
                "    [sub] {} ({} months, gift: {})",
                message.display_name().unwrap_or("?"),
                message.months(),
                message.is_gift()
            );
        })
        .await
    {
        Ok(listener) => listeners.push(listener),
        Err(e) => println!("    ✗ Subscriptions unavailable: {e}"),
    }

    match client
        .on_whisper(&user_id, |message, _ctx| {
            println!(
                "    [whisper] {}: {}",
                message.sender_display_name(),
                message.text()
            );
        })
        .await
    {
        Ok(listener) => listeners.push(listener),
        Err(e) => println!("    ✗ Whispers unavailable: {e}"),
    }

    for listener in &listeners {
        println!("    ✓ {}", listener.topic());
    }
    println!();

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[4] Removing listeners...");
    for listener in &listeners {
        if let Some(unlisten) = listener.remove() {
            let _ = unlisten.await;
        }
    }

    client.disconnect().await?;
    println!("    ✓ Disconnected");

    Ok(())
}
