//! Liveness and reconnection tests for the shared connection.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use common::{MockServer, WAIT};
use twitch_pubsub::protocol::{ListenData, NoncedRequest};
use twitch_pubsub::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState, Error};

// ============================================================================
// Helpers
// ============================================================================

/// Connection with a fast liveness probe.
fn fast_probe(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig {
        ping_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(60),
        ..server.config()
    }
}

/// Records every event emitted by `connection`.
fn record_events(connection: &Connection) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    connection.set_event_handler(Box::new(move |event: ConnectionEvent| {
        sink.lock().push(event);
    }));
    events
}

async fn wait_for_state(connection: &Connection, state: ConnectionState) -> anyhow::Result<()> {
    timeout(WAIT, async {
        while connection.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn connect_is_idempotent() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);

    connection.connect().await?;
    connection.connect().await?;

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(server.connection_count(), 1);
    assert_eq!(*events.lock(), vec![ConnectionEvent::Opened { reconnect: false }]);
    Ok(())
}

#[tokio::test]
async fn response_resolves_matching_request() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.set_auto_ack(false);
    let connection = Connection::new(server.config());
    connection.connect().await?;

    let request = {
        let connection = connection.clone();
        tokio::spawn(async move {
            connection
                .send_nonced(NoncedRequest::Listen(ListenData::single(
                    "whispers.42",
                    Some("token".to_string()),
                )))
                .await
        })
    };

    let listen = server.wait_for_frames("LISTEN", 1).await?.remove(0);
    assert_eq!(connection.pending_count(), 1);

    // A foreign nonce resolves nothing.
    server.send_raw(json!({ "type": "RESPONSE", "nonce": "other", "error": "" }).to_string())?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.pending_count(), 1);

    server.send_raw(
        json!({ "type": "RESPONSE", "nonce": listen["nonce"], "error": "" }).to_string(),
    )?;

    timeout(WAIT, request).await???;
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn pending_requests_fail_on_disconnect() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.set_auto_ack(false);
    let connection = Connection::new(server.config());
    connection.connect().await?;

    let request = {
        let connection = connection.clone();
        tokio::spawn(async move {
            connection
                .send_nonced(NoncedRequest::Unlisten(ListenData::single("whispers.42", None)))
                .await
        })
    };
    server.wait_for_frames("UNLISTEN", 1).await?;

    server.kill()?;

    let result = timeout(WAIT, request).await??;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_pong_forces_reconnect() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.set_auto_pong(false);
    let connection = Connection::new(fast_probe(&server));
    let events = record_events(&connection);
    connection.connect().await?;

    server.wait_for_frames("PING", 1).await?;
    server.wait_for_connections(2).await?;
    wait_for_state(&connection, ConnectionState::Connected).await?;

    let events = events.lock().clone();
    assert!(events.contains(&ConnectionEvent::Closed {
        was_clean: true,
        manual: true,
    }));
    assert!(events.contains(&ConnectionEvent::Opened { reconnect: true }));
    Ok(())
}

#[tokio::test]
async fn pong_keeps_connection_alive() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(fast_probe(&server));
    connection.connect().await?;

    server.wait_for_frames("PING", 3).await?;

    assert_eq!(server.connection_count(), 1);
    assert!(connection.is_connected());
    Ok(())
}

#[tokio::test]
async fn reconnect_packet_opens_new_connection() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);
    connection.connect().await?;

    server.send_reconnect()?;
    server.wait_for_connections(2).await?;
    wait_for_state(&connection, ConnectionState::Connected).await?;

    assert_eq!(
        *events.lock(),
        vec![
            ConnectionEvent::Opened { reconnect: false },
            ConnectionEvent::Closed {
                was_clean: true,
                manual: true,
            },
            ConnectionEvent::Opened { reconnect: true },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unclean_close_reconnects() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);
    connection.connect().await?;

    server.kill()?;
    server.wait_for_connections(2).await?;
    wait_for_state(&connection, ConnectionState::Connected).await?;

    assert!(events.lock().contains(&ConnectionEvent::Closed {
        was_clean: false,
        manual: false,
    }));
    Ok(())
}

#[tokio::test]
async fn clean_server_close_does_not_reconnect() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);
    connection.connect().await?;

    server.close(CloseCode::Normal)?;
    wait_for_state(&connection, ConnectionState::Disconnected).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(server.connection_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(events.lock().contains(&ConnectionEvent::Closed {
        was_clean: true,
        manual: false,
    }));
    Ok(())
}

#[tokio::test]
async fn abnormal_server_close_reconnects() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    connection.connect().await?;

    server.close(CloseCode::Away)?;
    server.wait_for_connections(2).await?;
    wait_for_state(&connection, ConnectionState::Connected).await?;
    Ok(())
}

#[tokio::test]
async fn manual_close_never_reconnects() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);
    connection.connect().await?;

    connection.close().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.connection_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(
        events.lock().last(),
        Some(&ConnectionEvent::Closed {
            was_clean: true,
            manual: true,
        })
    );
    Ok(())
}

#[tokio::test]
async fn messages_are_decoded_and_emitted() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(server.config());
    let events = record_events(&connection);
    connection.connect().await?;

    server.send_raw("not json")?;
    server.publish("whispers.42", &json!({ "type": "whisper_received" }))?;

    timeout(WAIT, async {
        while events.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    assert_eq!(
        events.lock()[1],
        ConnectionEvent::Message {
            topic: "whispers.42".to_string(),
            payload: json!({ "type": "whisper_received" }),
        }
    );
    Ok(())
}

#[tokio::test]
async fn close_interrupts_pending_handshake() -> anyhow::Result<()> {
    common::init_logging();

    // Accepts TCP but never answers the WebSocket upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let connection = Connection::new(ConnectionConfig {
        endpoint,
        connect_timeout: Duration::from_secs(3),
        ..ConnectionConfig::default()
    });

    let pending = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.connect().await })
    };
    wait_for_state(&connection, ConnectionState::Connecting).await?;

    let started = Instant::now();

    let request = connection
        .send_nonced(NoncedRequest::Listen(ListenData::single("whispers.42", None)))
        .await;
    assert!(matches!(request, Err(Error::ConnectionClosed)));
    assert_eq!(connection.pending_count(), 0);

    connection.close().await?;
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "close took {:?}",
        started.elapsed()
    );

    let result = timeout(WAIT, pending).await??;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn backoff_grows_and_resets_after_reconnect() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let connection = Connection::new(ConnectionConfig {
        backoff_unit: Duration::from_millis(100),
        max_backoff: Duration::from_secs(10),
        ..server.config()
    });
    connection.connect().await?;

    // Retries after the kill wait 0, 100, 100, 200 and 300 ms.
    server.set_refuse(true);
    let killed_at = Instant::now();
    server.kill()?;
    let attempts = server.wait_for_attempts(6).await?;

    let retries = &attempts[1..6];
    assert!(retries[0] - killed_at < Duration::from_millis(100));

    let gaps: Vec<Duration> = retries.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(90), "gaps {gaps:?}");
    assert!(gaps[3] >= Duration::from_millis(270), "gaps {gaps:?}");
    assert!(gaps[3] > gaps[0], "gaps {gaps:?}");

    server.set_refuse(false);
    server.wait_for_connections(2).await?;
    wait_for_state(&connection, ConnectionState::Connected).await?;

    // The successful handshake reset the counter: the next retry is immediate.
    let killed_at = Instant::now();
    server.kill()?;
    server.wait_for_connections(3).await?;
    assert!(
        killed_at.elapsed() < Duration::from_millis(250),
        "retry took {:?}",
        killed_at.elapsed()
    );
    Ok(())
}
