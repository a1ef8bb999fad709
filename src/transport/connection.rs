//! PubSub connection and its driver task.
//!
//! This module owns the single WebSocket connection to the service,
//! including nonce correlation, liveness probing and reconnection.
//!
//! # Driver
//!
//! [`Connection::new`] spawns a tokio task that exclusively owns:
//!
//! - The socket and the [`ConnectionState`]
//! - The manual-disconnect flag and the backoff counter
//! - The ping, pong-timeout and retry timers
//!
//! Every [`Connection`] handle talks to it over a command channel. The
//! task stops once all handles are dropped.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!      ▲                        │                 │
//!      │ close                  │ failed          │ unclean close
//!      │                        ▼                 ▼
//!      └──────────────── Reconnecting ◄───────────┘
//!                        (backoff timer)
//! ```
//!
//! A missing `PONG` or a `RECONNECT` packet tears the socket down as a
//! manual disconnect and opens a new one immediately.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::Nonce;
use crate::protocol::{IncomingPacket, NoncedRequest, OutgoingPacket};

use super::backoff::Backoff;
use super::config::ConnectionConfig;
use super::correlator::Correlator;

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for writing the close frame on teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Socket type produced by `connect_async`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection event callback.
///
/// Runs on the driver task, so invocations never overlap and follow
/// socket delivery order.
pub type EventHandler = Box<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Shared slot holding the current event handler.
type HandlerSlot = Arc<RwLock<Option<Arc<dyn Fn(ConnectionEvent) + Send + Sync>>>>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket and no retry scheduled.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Notifications emitted by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Opened {
        /// `true` if an earlier connection existed.
        reconnect: bool,
    },
    /// A `MESSAGE` packet with its payload already decoded.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Decoded payload.
        payload: Value,
    },
    /// The socket closed.
    Closed {
        /// `true` if the close followed a normal close handshake.
        was_clean: bool,
        /// `true` if the close was requested locally.
        manual: bool,
    },
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the driver.
enum ConnectionCommand {
    /// Open the socket unless already open.
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Best-effort send.
    Send(OutgoingPacket),
    /// Send a packet whose nonce is registered in the correlator.
    SendNonced(OutgoingPacket),
    /// Tear down and open a new socket now.
    Reconnect,
    /// Manual disconnect.
    Close { reply: oneshot::Sender<()> },
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to the shared PubSub connection.
///
/// Cloning is cheap; all clones drive the same socket.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the driver.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Pending nonced requests (shared with the driver).
    correlator: Arc<Correlator>,
    /// Event handler (shared with the driver).
    event_handler: HandlerSlot,
    /// Last state published by the driver.
    state: Arc<RwLock<ConnectionState>>,
    /// Bound on a nonced request round trip.
    request_timeout: Duration,
}

impl Connection {
    /// Creates a connection handle and spawns its driver.
    ///
    /// No socket is opened until [`connect`](Self::connect) is called.
    /// Must be called within a Tokio runtime.
    pub fn new(config: ConnectionConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new());
        let event_handler: HandlerSlot = Arc::new(RwLock::new(None));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let request_timeout = config.request_timeout;

        let driver = Driver {
            backoff: Backoff::new(config.backoff_unit, config.max_backoff),
            config,
            command_rx,
            correlator: Arc::clone(&correlator),
            event_handler: Arc::clone(&event_handler),
            shared_state: Arc::clone(&state),
            socket: None,
            state: ConnectionState::Disconnected,
            manual_disconnect: false,
            has_connected: false,
            connect_waiters: Vec::new(),
            timers: Timers::default(),
        };

        tokio::spawn(driver.run());

        Self {
            command_tx,
            correlator,
            event_handler,
            state,
            request_timeout,
        }
    }

    /// Opens the socket, or returns immediately if it is already open.
    ///
    /// While a backoff retry is scheduled, waits for that attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the handshake fails
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds the connect timeout
    /// - [`Error::ConnectionClosed`] if the driver is gone
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Connect { reply })
            .map_err(|_| Error::ConnectionClosed)?;

        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends a packet without waiting for anything.
    ///
    /// Best effort: the packet is dropped if the socket is not open.
    /// Recovery happens through reconnection and resubscription.
    pub fn send(&self, packet: OutgoingPacket) {
        let _ = self.command_tx.send(ConnectionCommand::Send(packet));
    }

    /// Sends a request with a fresh nonce and waits for its `RESPONSE`.
    ///
    /// # Errors
    ///
    /// - [`Error::Request`] if the service answers with an error
    /// - [`Error::RequestTimeout`] if no answer arrives within the request timeout
    /// - [`Error::ConnectionClosed`] if the socket is closed before an answer
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send_nonced(&self, request: NoncedRequest) -> Result<()> {
        let nonce = Nonce::generate();
        let response_rx = self.correlator.register(nonce.clone())?;

        if self
            .command_tx
            .send(ConnectionCommand::SendNonced(request.with_nonce(nonce.clone())))
            .is_err()
        {
            self.correlator.forget(&nonce);
            return Err(Error::ConnectionClosed);
        }

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.correlator.forget(&nonce);
                Err(Error::request_timeout(
                    nonce,
                    self.request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Drops the current socket and opens a new one right away.
    pub fn reconnect(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Reconnect);
    }

    /// Closes the socket without scheduling a reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the driver is gone.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Close { reply })
            .map_err(|_| Error::ConnectionClosed)?;

        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        *self.event_handler.write() = Some(Arc::from(handler));
    }

    /// Returns the last state published by the driver.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns `true` if the socket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of pending nonced requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }
}

// ============================================================================
// Timers
// ============================================================================

/// Deadlines armed by the driver. All cleared on teardown.
#[derive(Debug, Clone, Copy, Default)]
struct Timers {
    /// Next liveness probe.
    next_ping: Option<Instant>,
    /// Deadline for the outstanding probe's `PONG`.
    pong_deadline: Option<Instant>,
    /// Next backoff retry.
    retry_at: Option<Instant>,
}

/// Sleeps until `deadline`, or forever if there is none.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// DriverEvent
// ============================================================================

/// What woke the driver up.
enum DriverEvent {
    Command(Option<ConnectionCommand>),
    Frame(Option<std::result::Result<Message, WsError>>),
    PingDue,
    PongTimeout,
    RetryDue,
}

// ============================================================================
// OpenStep
// ============================================================================

/// What woke a pending handshake up.
enum OpenStep<T> {
    Done(T),
    Command(Option<ConnectionCommand>),
}

// ============================================================================
// OpenFailure
// ============================================================================

/// Why a handshake attempt failed.
enum OpenFailure {
    Handshake(String),
    Timeout(u64),
}

impl OpenFailure {
    fn to_error(&self) -> Error {
        match self {
            Self::Handshake(message) => Error::connection(message.clone()),
            Self::Timeout(timeout_ms) => Error::connection_timeout(*timeout_ms),
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Single owner of the socket and every piece of connection state.
struct Driver {
    config: ConnectionConfig,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    correlator: Arc<Correlator>,
    event_handler: HandlerSlot,
    shared_state: Arc<RwLock<ConnectionState>>,
    socket: Option<WsStream>,
    state: ConnectionState,
    manual_disconnect: bool,
    backoff: Backoff,
    /// Whether any handshake has ever succeeded.
    has_connected: bool,
    /// Callers of `connect()` waiting for the next attempt.
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    timers: Timers,
}

impl Driver {
    /// Main loop. Ends when every [`Connection`] handle is dropped.
    async fn run(mut self) {
        loop {
            match self.next_event().await {
                DriverEvent::Command(Some(command)) => self.handle_command(command).await,
                DriverEvent::Command(None) => {
                    debug!("Command channel closed");
                    break;
                }
                DriverEvent::Frame(frame) => self.handle_frame(frame).await,
                DriverEvent::PingDue => self.send_ping().await,
                DriverEvent::PongTimeout => {
                    warn!(
                        timeout_ms = self.config.pong_timeout.as_millis() as u64,
                        "No PONG received, reconnecting"
                    );
                    self.reconnect_now().await;
                }
                DriverEvent::RetryDue => self.open().await,
            }
        }

        self.close_socket().await;
        self.teardown();
        debug!("Connection driver terminated");
    }

    /// Waits for the next command, frame or timer.
    async fn next_event(&mut self) -> DriverEvent {
        let timers = self.timers;

        match self.socket.as_mut() {
            Some(socket) => tokio::select! {
                command = self.command_rx.recv() => DriverEvent::Command(command),
                frame = socket.next() => DriverEvent::Frame(frame),
                () = sleep_until_deadline(timers.pong_deadline) => DriverEvent::PongTimeout,
                () = sleep_until_deadline(timers.next_ping) => DriverEvent::PingDue,
            },
            None => tokio::select! {
                command = self.command_rx.recv() => DriverEvent::Command(command),
                () = sleep_until_deadline(timers.retry_at) => DriverEvent::RetryDue,
            },
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { reply } => match self.state {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    self.connect_waiters.push(reply);
                }
                ConnectionState::Disconnected => {
                    self.connect_waiters.push(reply);
                    self.manual_disconnect = false;
                    self.open().await;
                }
            },

            ConnectionCommand::Send(packet) => {
                if let Err(e) = self.send_packet(&packet).await {
                    debug!(error = %e, "Dropped outgoing packet");
                }
            }

            ConnectionCommand::SendNonced(packet) => {
                if let Err(e) = self.send_packet(&packet).await
                    && let Some(nonce) = packet.nonce()
                {
                    debug!(%nonce, error = %e, "Nonced request not sent");
                    self.correlator.reject(nonce, e);
                }
            }

            ConnectionCommand::Reconnect => match self.state {
                ConnectionState::Connected | ConnectionState::Reconnecting => {
                    self.reconnect_now().await;
                }
                ConnectionState::Connecting | ConnectionState::Disconnected => {
                    debug!(state = ?self.state, "Reconnect ignored");
                }
            },

            ConnectionCommand::Close { reply } => {
                debug!("Manual disconnect requested");
                self.manual_disconnect = true;
                let had_socket = self.socket.is_some();
                self.close_socket().await;
                self.finish_close(had_socket, reply);
            }
        }
    }

    /// Handles a command that arrives while a handshake is in flight.
    ///
    /// Returns `false` if the handshake must be abandoned.
    fn handle_command_while_opening(&mut self, command: Option<ConnectionCommand>) -> bool {
        match command {
            Some(ConnectionCommand::Connect { reply }) => {
                self.connect_waiters.push(reply);
                true
            }
            Some(ConnectionCommand::Send(_)) => {
                debug!("Dropped outgoing packet during handshake");
                true
            }
            Some(ConnectionCommand::SendNonced(packet)) => {
                if let Some(nonce) = packet.nonce() {
                    debug!(%nonce, "Nonced request not sent during handshake");
                    self.correlator.reject(nonce, Error::ConnectionClosed);
                }
                true
            }
            Some(ConnectionCommand::Reconnect) => {
                debug!("Reconnect ignored during handshake");
                true
            }
            Some(ConnectionCommand::Close { reply }) => {
                debug!("Manual disconnect aborts handshake");
                self.manual_disconnect = true;
                self.finish_close(false, reply);
                false
            }
            None => {
                debug!("Command channel closed during handshake");
                false
            }
        }
    }

    /// Completes a manual disconnect once the socket, if any, is closed.
    fn finish_close(&mut self, had_socket: bool, reply: oneshot::Sender<()>) {
        self.teardown();

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(Error::ConnectionClosed));
        }

        if had_socket {
            info!("Connection closed manually");
            self.emit(ConnectionEvent::Closed {
                was_clean: true,
                manual: true,
            });
        }
        let _ = reply.send(());
    }

    // ========================================================================
    // Socket Lifecycle
    // ========================================================================

    /// Runs one handshake attempt.
    ///
    /// Commands keep being served while the handshake is in flight; a
    /// manual disconnect drops the attempt.
    async fn open(&mut self) {
        self.set_state(ConnectionState::Connecting);
        self.timers.retry_at = None;

        let connect_timeout = self.config.connect_timeout;
        let endpoint = self.config.endpoint.clone();
        debug!(%endpoint, "Opening connection");

        let handshake = timeout(connect_timeout, connect_async(endpoint.as_str()));
        tokio::pin!(handshake);

        let outcome = loop {
            let step = tokio::select! {
                result = &mut handshake => OpenStep::Done(result),
                command = self.command_rx.recv() => OpenStep::Command(command),
            };

            match step {
                OpenStep::Done(Ok(Ok((socket, _response)))) => break Ok(socket),
                OpenStep::Done(Ok(Err(e))) => break Err(OpenFailure::Handshake(e.to_string())),
                OpenStep::Done(Err(_)) => {
                    break Err(OpenFailure::Timeout(connect_timeout.as_millis() as u64));
                }
                OpenStep::Command(command) => {
                    if !self.handle_command_while_opening(command) {
                        return;
                    }
                }
            }
        };

        match outcome {
            Ok(socket) => {
                let reconnect = self.has_connected;
                self.socket = Some(socket);
                self.has_connected = true;
                self.manual_disconnect = false;
                self.backoff.reset();
                self.timers.next_ping = Some(Instant::now() + self.config.ping_interval);
                self.set_state(ConnectionState::Connected);

                info!(endpoint = %self.config.endpoint, reconnect, "Connection established");

                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.emit(ConnectionEvent::Opened { reconnect });
            }
            Err(failure) => {
                let error = failure.to_error();
                warn!(error = %error, "Connection attempt failed");

                self.schedule_retry();
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(failure.to_error()));
                }
            }
        }
    }

    /// Handles a close that was not requested locally.
    fn handle_closed(&mut self, was_clean: bool, reason: &str) {
        let manual = std::mem::take(&mut self.manual_disconnect);
        self.teardown();

        info!(was_clean, manual, reason, "Connection closed");
        self.emit(ConnectionEvent::Closed { was_clean, manual });

        if !manual && !was_clean {
            self.schedule_retry();
        }
    }

    /// Tears the socket down as a manual disconnect and reopens at once.
    async fn reconnect_now(&mut self) {
        info!("Reconnecting");
        let had_socket = self.socket.is_some();
        self.close_socket().await;
        self.teardown();

        if had_socket {
            self.emit(ConnectionEvent::Closed {
                was_clean: true,
                manual: true,
            });
        }
        self.open().await;
    }

    /// Arms the retry timer with the next backoff delay.
    fn schedule_retry(&mut self) {
        let attempt = self.backoff.attempt();
        let delay = self.backoff.next_delay();
        self.timers.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);

        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
    }

    /// Writes a close frame, if a socket is open.
    async fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take()
            && let Err(e) = timeout(CLOSE_TIMEOUT, socket.close(None))
                .await
                .unwrap_or(Ok(()))
        {
            debug!(error = %e, "Failed to send close frame");
        }
    }

    /// Drops the socket, clears all timers and fails pending requests.
    fn teardown(&mut self) {
        self.socket = None;
        self.timers = Timers::default();
        self.correlator.fail_all();
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            trace!(from = ?self.state, to = ?state, "Connection state changed");
        }
        self.state = state;
        *self.shared_state.write() = state;
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    /// Sends a `PING` and arms the `PONG` deadline.
    async fn send_ping(&mut self) {
        let now = Instant::now();
        self.timers.next_ping = Some(now + self.config.ping_interval);

        if self.timers.pong_deadline.is_none() {
            self.timers.pong_deadline = Some(now + self.config.pong_timeout);
        }

        trace!("Sending PING");
        if let Err(e) = self.send_packet(&OutgoingPacket::Ping).await {
            warn!(error = %e, "Failed to send PING");
        }
    }

    // ========================================================================
    // I/O
    // ========================================================================

    /// Serializes and writes one packet.
    async fn send_packet(&mut self, packet: &OutgoingPacket) -> Result<()> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(Error::ConnectionClosed);
        };

        let json = packet.to_json()?;
        socket.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Option<std::result::Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.handle_incoming_message(text.as_str()).await,

            Some(Ok(Message::Close(close_frame))) => {
                let was_clean = close_frame
                    .as_ref()
                    .is_some_and(|frame| frame.code == CloseCode::Normal);
                let reason = close_frame
                    .as_ref()
                    .map(|frame| frame.reason.as_str().to_string())
                    .unwrap_or_default();
                self.handle_closed(was_clean, &reason);
            }

            Some(Err(e)) => {
                warn!(error = %e, "WebSocket error");
                self.handle_closed(false, &e.to_string());
            }

            None => self.handle_closed(false, "stream ended"),

            // Ignore Binary, Ping, Pong, Frame
            Some(Ok(_)) => {}
        }
    }

    /// Classifies one text frame from the service.
    async fn handle_incoming_message(&mut self, text: &str) {
        let packet = match IncomingPacket::parse(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, text = %text, "Failed to parse incoming message");
                return;
            }
        };

        match packet {
            IncomingPacket::Pong => {
                trace!("PONG received");
                self.timers.pong_deadline = None;
            }

            IncomingPacket::Reconnect => {
                info!("Service requested reconnect");
                self.reconnect_now().await;
            }

            IncomingPacket::Response {
                nonce: Some(nonce),
                error,
            } => {
                self.correlator.resolve(&nonce, error.as_deref());
            }

            IncomingPacket::Response { nonce: None, .. } => {
                warn!(text = %text, "Response without nonce");
            }

            IncomingPacket::Message { data } => match data.payload() {
                Ok(payload) => self.emit(ConnectionEvent::Message {
                    topic: data.topic,
                    payload,
                }),
                Err(e) => warn!(error = %e, "Dropped message with invalid payload"),
            },

            IncomingPacket::Unknown => {
                warn!(text = %text, "Unknown packet type ignored");
            }
        }
    }

    /// Invokes the event handler, if set.
    fn emit(&self, event: ConnectionEvent) {
        let handler = self.event_handler.read().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
