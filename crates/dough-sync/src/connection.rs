use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use dough_core::ConnectionId;

use crate::backoff::ReconnectPolicy;
use crate::dispatcher::EventDispatcher;
use crate::engine::EngineInput;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Missed heartbeats tolerated before the link is considered dead.
const MISSED_HEARTBEATS: u32 = 3;

/// Floor for the heartbeat period.
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// A connection that drops sooner than this after opening counts as a failed
/// attempt, so a server that accepts and immediately hangs up still backs off.
pub const STABLE_AFTER: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid push url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<tungstenite::Error> for ConnectionError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Url(e) => Self::InvalidUrl(e.to_string()),
            tungstenite::Error::HttpFormat(e) => Self::InvalidUrl(e.to_string()),
            other => Self::Connect(other.to_string()),
        }
    }
}

/// Status machine for the push channel.
///
/// Allowed moves: `Disconnected -> Connecting`, `Connecting -> Connected`,
/// `Connecting -> Disconnected` (attempt failed) and
/// `Connected -> Disconnected`. Anything else is refused.
///
/// The failure count only resets when a connection closes after staying up
/// for the stable window.
#[derive(Debug)]
pub struct ConnectionState {
    status: ConnectionStatus,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    stable_after: Duration,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(STABLE_AFTER)
    }
}

impl ConnectionState {
    pub fn new(stable_after: Duration) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            consecutive_failures: 0,
            opened_at: None,
            stable_after,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn connecting(&mut self) -> bool {
        if self.status != ConnectionStatus::Disconnected {
            return false;
        }
        self.status = ConnectionStatus::Connecting;
        true
    }

    pub fn opened(&mut self) -> bool {
        if self.status != ConnectionStatus::Connecting {
            return false;
        }
        self.status = ConnectionStatus::Connected;
        self.opened_at = Some(Instant::now());
        true
    }

    pub fn closed(&mut self) -> bool {
        match self.status {
            ConnectionStatus::Disconnected => false,
            ConnectionStatus::Connecting => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.status = ConnectionStatus::Disconnected;
                true
            }
            ConnectionStatus::Connected => {
                let stable = self
                    .opened_at
                    .take()
                    .is_some_and(|at| at.elapsed() >= self.stable_after);
                self.consecutive_failures = if stable {
                    0
                } else {
                    self.consecutive_failures.saturating_add(1)
                };
                self.status = ConnectionStatus::Disconnected;
                true
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    /// The link dropped; reconnect.
    Lost,
    Cancelled,
    /// Nobody is listening for events any more.
    EngineGone,
}

/// Owns the push channel: connects, pumps frames into the engine, and
/// reconnects with backoff until cancelled.
pub struct ConnectionManager {
    url: String,
    policy: ReconnectPolicy,
    heartbeat: Duration,
    state: ConnectionState,
    status_tx: watch::Sender<ConnectionStatus>,
    dispatcher: EventDispatcher,
}

impl ConnectionManager {
    /// `heartbeat` below one second is raised to one second.
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, heartbeat: Duration) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        if heartbeat < MIN_HEARTBEAT {
            warn!(heartbeat_ms = heartbeat.as_millis() as u64, "heartbeat too short, using 1s");
        }
        Self {
            url: url.into(),
            policy,
            heartbeat: heartbeat.max(MIN_HEARTBEAT),
            state: ConnectionState::default(),
            status_tx,
            dispatcher: EventDispatcher::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.state.status());
    }

    async fn connect(&self) -> Result<WsStream, ConnectionError> {
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        Ok(ws)
    }

    /// Run until `cancel` fires or the engine stops listening.
    pub async fn run(mut self, events: mpsc::Sender<EngineInput>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.state.connecting();
            self.publish();
            let conn_id = ConnectionId::new();
            debug!(conn_id = %conn_id, url = %self.url, "connecting");

            let attempt = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.connect() => Some(result),
            };
            let Some(attempt) = attempt else {
                self.state.closed();
                break;
            };

            match attempt {
                Ok(ws) => {
                    self.state.opened();
                    self.publish();
                    info!(conn_id = %conn_id, "push channel connected");
                    if events.send(EngineInput::SetConnected(true)).await.is_err() {
                        self.state.closed();
                        break;
                    }

                    let end = self.pump(ws, &conn_id, &events, &cancel).await;

                    self.state.closed();
                    self.publish();
                    let _ = events.send(EngineInput::SetConnected(false)).await;
                    if end != PumpEnd::Lost {
                        debug!(conn_id = %conn_id, reason = ?end, "push channel stopped");
                        break;
                    }
                    warn!(
                        conn_id = %conn_id,
                        failures = self.state.consecutive_failures(),
                        "push channel lost"
                    );
                }
                Err(e) => {
                    self.state.closed();
                    self.publish();
                    warn!(
                        conn_id = %conn_id,
                        error = %e,
                        failures = self.state.consecutive_failures(),
                        "push channel connect failed"
                    );
                }
            }

            let delay = self.policy.delay_for(self.state.consecutive_failures());
            info!(delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish();
        let stats = self.dispatcher.stats();
        debug!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            unknown = stats.unknown,
            "push channel torn down"
        );
    }

    async fn pump(
        &mut self,
        ws: WsStream,
        conn_id: &ConnectionId,
        events: &mpsc::Sender<EngineInput>,
        cancel: &CancellationToken,
    ) -> PumpEnd {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await; // consume first immediate tick
        let mut last_seen = Instant::now();
        let timeout = self.heartbeat * MISSED_HEARTBEATS;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return PumpEnd::Cancelled;
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > timeout {
                        warn!(conn_id = %conn_id, "no traffic from server, dropping link");
                        return PumpEnd::Lost;
                    }
                    if ws_tx.send(Message::text("ping")).await.is_err() {
                        return PumpEnd::Lost;
                    }
                    trace!(conn_id = %conn_id, "sent ping");
                }
                msg = ws_rx.next() => {
                    last_seen = Instant::now();
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                warn!(conn_id = %conn_id, "dropping non-utf8 binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            info!(conn_id = %conn_id, frame = ?frame, "server closed push channel");
                            return PumpEnd::Lost;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            let e = ConnectionError::Transport(e.to_string());
                            warn!(conn_id = %conn_id, error = %e, "push channel error");
                            return PumpEnd::Lost;
                        }
                        None => return PumpEnd::Lost,
                    };

                    if text == "pong" {
                        trace!(conn_id = %conn_id, "pong");
                        continue;
                    }
                    if let Some(envelope) = self.dispatcher.accept(&text) {
                        if events.send(EngineInput::Push(envelope)).await.is_err() {
                            return PumpEnd::EngineGone;
                        }
                    }
                }
            }
        }
    }
}
