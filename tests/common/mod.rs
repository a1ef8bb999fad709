//! In-process mock of the PubSub service for integration tests.
//!
//! Records every frame the client sends, answers `PING` and
//! `LISTEN`/`UNLISTEN` on request, and can push packets or kill the
//! socket to drive the client's reconnect paths.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;
use twitch_pubsub::{ConnectionConfig, PubSubClient};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for every wait in the tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Polling step while waiting for server-side observations.
const POLL: Duration = Duration::from_millis(10);

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockServer
// ============================================================================

enum ServerCommand {
    Send(String),
    Close(CloseCode),
    Drop,
}

struct Shared {
    auto_ack: AtomicBool,
    auto_pong: AtomicBool,
    refuse: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    listen_error: Mutex<Option<String>>,
    frames: Mutex<Vec<Value>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<ServerCommand>>>,
    accepted: AtomicUsize,
}

/// Mock PubSub service bound to a random local port.
pub struct MockServer {
    endpoint: String,
    shared: Arc<Shared>,
}

impl MockServer {
    /// Starts a server that answers `PING` and acknowledges every request.
    pub async fn start() -> anyhow::Result<Self> {
        init_logging();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock server")?;
        let endpoint = format!("ws://{}", listener.local_addr()?);

        let shared = Arc::new(Shared {
            auto_ack: AtomicBool::new(true),
            auto_pong: AtomicBool::new(true),
            refuse: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            listen_error: Mutex::new(None),
            frames: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
        });

        tokio::spawn(accept_loop(listener, Arc::clone(&shared)));

        Ok(Self { endpoint, shared })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connection settings pointing at this server with test-sized timings.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint.clone(),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            backoff_unit: Duration::from_millis(20),
            max_backoff: Duration::from_millis(200),
        }
    }

    /// Builds a client against this server.
    pub fn client(&self) -> anyhow::Result<PubSubClient> {
        Ok(PubSubClient::builder().config(self.config()).build()?)
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        self.shared.auto_ack.store(enabled, Ordering::SeqCst);
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.shared.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Drops new TCP connections before the WebSocket upgrade.
    pub fn set_refuse(&self, enabled: bool) {
        self.shared.refuse.store(enabled, Ordering::SeqCst);
    }

    /// Answers every `LISTEN` with `error`.
    pub fn set_listen_error(&self, error: impl Into<String>) {
        *self.shared.listen_error.lock() = Some(error.into());
    }

    /// Number of WebSocket handshakes accepted so far.
    pub fn connection_count(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Arrival time of every TCP connection, refused ones included.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.shared.attempts.lock().clone()
    }

    /// Waits until at least `count` TCP connections arrived.
    pub async fn wait_for_attempts(&self, count: usize) -> anyhow::Result<Vec<Instant>> {
        tokio::time::timeout(WAIT, async {
            loop {
                let attempts = self.attempt_times();
                if attempts.len() >= count {
                    return attempts;
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .map_err(|_| {
            anyhow!(
                "expected {count} connection attempts, saw {}",
                self.attempt_times().len()
            )
        })
    }

    /// All frames received, across connections.
    pub fn frames(&self) -> Vec<Value> {
        self.shared.frames.lock().clone()
    }

    /// Frames of one packet type.
    pub fn frames_of(&self, packet_type: &str) -> Vec<Value> {
        self.shared
            .frames
            .lock()
            .iter()
            .filter(|frame| frame["type"] == packet_type)
            .cloned()
            .collect()
    }

    /// Waits until at least `count` frames of `packet_type` arrived.
    pub async fn wait_for_frames(
        &self,
        packet_type: &str,
        count: usize,
    ) -> anyhow::Result<Vec<Value>> {
        tokio::time::timeout(WAIT, async {
            loop {
                let frames = self.frames_of(packet_type);
                if frames.len() >= count {
                    return frames;
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .map_err(|_| {
            anyhow!(
                "expected {count} {packet_type} frames, saw {}",
                self.frames_of(packet_type).len()
            )
        })
    }

    /// Waits until at least `count` handshakes were accepted.
    pub async fn wait_for_connections(&self, count: usize) -> anyhow::Result<()> {
        tokio::time::timeout(WAIT, async {
            while self.connection_count() < count {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .map_err(|_| {
            anyhow!(
                "expected {count} connections, saw {}",
                self.connection_count()
            )
        })
    }

    /// Sends a raw text frame on the newest connection.
    pub fn send_raw(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.command(ServerCommand::Send(text.into()))
    }

    /// Publishes `payload` on `topic` as a `MESSAGE` packet.
    pub fn publish(&self, topic: &str, payload: &Value) -> anyhow::Result<()> {
        let packet = json!({
            "type": "MESSAGE",
            "data": { "topic": topic, "message": payload.to_string() },
        });
        self.send_raw(packet.to_string())
    }

    /// Asks the client to reconnect.
    pub fn send_reconnect(&self) -> anyhow::Result<()> {
        self.send_raw(json!({ "type": "RECONNECT" }).to_string())
    }

    /// Closes the newest connection with a close handshake.
    pub fn close(&self, code: CloseCode) -> anyhow::Result<()> {
        self.command(ServerCommand::Close(code))
    }

    /// Drops the newest connection without a close handshake.
    pub fn kill(&self) -> anyhow::Result<()> {
        self.command(ServerCommand::Drop)
    }

    fn command(&self, command: ServerCommand) -> anyhow::Result<()> {
        let connections = self.shared.connections.lock();
        let sender = connections.last().context("no connection accepted yet")?;
        sender
            .send(command)
            .map_err(|_| anyhow!("connection task gone"))
    }
}

// ============================================================================
// Server Tasks
// ============================================================================

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((stream, _)) = listener.accept().await {
        shared.attempts.lock().push(Instant::now());
        if shared.refuse.load(Ordering::SeqCst) {
            drop(stream);
            continue;
        }
        tokio::spawn(serve(stream, Arc::clone(&shared)));
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    shared.connections.lock().push(tx);
    shared.accepted.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(ServerCommand::Send(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ServerCommand::Close(code)) => {
                    let frame = CloseFrame { code, reason: "closing".into() };
                    let _ = ws.close(Some(frame)).await;
                }
                Some(ServerCommand::Drop) | None => break,
            },

            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(reply) = record(&shared, text.as_str()) else {
                        continue;
                    };
                    if ws.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Stores a client frame and returns the automatic reply, if any.
fn record(shared: &Shared, text: &str) -> Option<String> {
    let frame: Value = serde_json::from_str(text).ok()?;
    shared.frames.lock().push(frame.clone());

    match frame["type"].as_str()? {
        "PING" if shared.auto_pong.load(Ordering::SeqCst) => {
            Some(json!({ "type": "PONG" }).to_string())
        }
        packet_type @ ("LISTEN" | "UNLISTEN") if shared.auto_ack.load(Ordering::SeqCst) => {
            let error = if packet_type == "LISTEN" {
                shared.listen_error.lock().clone().unwrap_or_default()
            } else {
                String::new()
            };
            Some(
                json!({ "type": "RESPONSE", "nonce": frame["nonce"], "error": error })
                    .to_string(),
            )
        }
        _ => None,
    }
}
