use crate::core::backoff::Backoff;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{StreamMessage, WsCodec};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{instrument, warn};

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Timeout for a single transport-open attempt.
    pub connect_timeout: Duration,
    /// Window in which at least one inbound frame must arrive before the
    /// connection is considered stalled and torn down.
    pub heartbeat_timeout: Duration,
    /// Backoff policy consulted between connection attempts. A fresh copy
    /// is taken each time a connect cycle starts.
    pub backoff: Backoff,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            backoff: Backoff::default(),
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, heartbeat_timeout: Duration) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Events delivered to the subscriber of one connection.
#[derive(Debug)]
pub enum StreamEvent {
    /// The transport opened (initial connect or after a reconnect).
    Open,
    /// One decoded inbound frame, in transport-arrival order.
    Message(StreamMessage),
    /// A connection attempt failed; waiting before the next one.
    Reconnecting { attempt: u32, delay: Duration },
    /// A session keep-alive renewal failed; the subscription continues.
    KeepAliveError(String),
    /// The connection is gone and no further reconnects are scheduled.
    Error(String),
    /// Caller-initiated teardown completed.
    Closed,
}

pub type EventSender = mpsc::UnboundedSender<StreamEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Deferred connection target requiring an authenticated session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Resolve to a concrete endpoint URL, arming any background session
    /// maintenance. Called once per connect cycle; a later cycle resolves
    /// again and supersedes the previous session.
    async fn resolve(&self, events: &EventSender) -> Result<String, ExchangeError>;

    /// Stop background session maintenance.
    fn release(&self);
}

/// Where a connection points: a literal endpoint URL, or an authenticated
/// session resolved asynchronously before each connect cycle.
#[derive(Clone)]
pub enum ConnectionTarget {
    Url(String),
    Session(Arc<dyn SessionProvider>),
}

impl ConnectionTarget {
    async fn resolve(&self, events: &EventSender) -> Result<String, ExchangeError> {
        match self {
            Self::Url(url) => Ok(url.clone()),
            Self::Session(session) => session.resolve(events).await,
        }
    }

    fn release(&self) {
        if let Self::Session(session) = self {
            session.release();
        }
    }
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Session(_) => f.write_str("Session(..)"),
        }
    }
}

enum Command {
    Disconnect,
    ForceDisconnect,
}

enum SessionEnd {
    Shutdown { graceful: bool },
    ChannelClosed,
    Lost(String),
}

enum Reopen {
    Connected(WsStream),
    Shutdown,
    Failed(ExchangeError),
}

/// Owns one logical stream connection and its supervision task.
///
/// The manager keeps at most one live transport. Lost or stalled
/// connections are replaced transparently; the registered event channel and
/// the manager identity survive reconnects. Only `disconnect` /
/// `force_disconnect` reach the terminal `Closed` state.
pub struct WsClient {
    target: ConnectionTarget,
    codec: Arc<dyn WsCodec<Message = StreamMessage>>,
    config: WsConfig,
    events: EventSender,
    state_tx: Arc<watch::Sender<SocketState>>,
    state_rx: watch::Receiver<SocketState>,
    cmd_tx: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl WsClient {
    /// Create a client for the given target and codec; events for the
    /// connection are delivered on the returned receiver.
    pub fn new<C>(target: ConnectionTarget, codec: C, config: WsConfig) -> (Self, EventReceiver)
    where
        C: WsCodec<Message = StreamMessage>,
    {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SocketState::Idle);
        (
            Self {
                target,
                codec: Arc::new(codec),
                config,
                events,
                state_tx: Arc::new(state_tx),
                state_rx,
                cmd_tx: None,
                task: None,
            },
            receiver,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SocketState {
        *self.state_rx.borrow()
    }

    /// Watch channel following lifecycle state changes.
    pub fn state_watch(&self) -> watch::Receiver<SocketState> {
        self.state_rx.clone()
    }

    fn set_state(&self, state: SocketState) {
        let _ = self.state_tx.send(state);
    }

    /// Resolve the target and open the transport, retrying per the backoff
    /// policy. Returns once the transport is open; with a bounded policy,
    /// exhaustion is returned as `ReconnectExhausted`.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> Result<(), ExchangeError> {
        // Idempotent teardown of any previous transport.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.cmd_tx = None;
        self.set_state(SocketState::Connecting);

        let url = match self.target.resolve(&self.events).await {
            Ok(url) => url,
            Err(error) => {
                self.set_state(SocketState::Idle);
                return Err(error);
            }
        };

        let mut backoff = self.config.backoff.clone();
        let socket = loop {
            // Retries reuse the resolved endpoint; resolution happens once
            // per connect cycle.
            match open_transport(&url, self.config.connect_timeout).await {
                Ok(socket) => break socket,
                Err(error) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            error = %error,
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            "connection attempt failed, retrying"
                        );
                        let _ = self.events.send(StreamEvent::Reconnecting {
                            attempt: backoff.attempt(),
                            delay,
                        });
                        sleep(delay).await;
                    }
                    None => {
                        self.target.release();
                        self.set_state(SocketState::Idle);
                        return Err(ExchangeError::ReconnectExhausted {
                            attempts: backoff.attempt(),
                        });
                    }
                },
            }
        };

        self.set_state(SocketState::Connected);
        let _ = self.events.send(StreamEvent::Open);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.cmd_tx = Some(cmd_tx);
        let ctx = SessionCtx {
            target: self.target.clone(),
            codec: Arc::clone(&self.codec),
            config: self.config.clone(),
            events: self.events.clone(),
            state: Arc::clone(&self.state_tx),
        };
        self.task = Some(tokio::spawn(supervise(socket, cmd_rx, ctx)));
        Ok(())
    }

    /// Gracefully close the connection with no further reconnects.
    pub async fn disconnect(&mut self) {
        self.shutdown(Command::Disconnect).await;
    }

    /// Terminate the connection immediately with no further reconnects.
    pub async fn force_disconnect(&mut self) {
        self.shutdown(Command::ForceDisconnect).await;
    }

    async fn shutdown(&mut self, command: Command) {
        let delivered = self
            .cmd_tx
            .take()
            .is_some_and(|tx| tx.send(command).is_ok());

        if let Some(task) = self.task.take() {
            if delivered {
                let _ = task.await;
                return;
            }
            task.abort();
        }

        // No live supervision task; finish the teardown here.
        self.target.release();
        self.set_state(SocketState::Closed);
        let _ = self.events.send(StreamEvent::Closed);
    }
}

struct SessionCtx {
    target: ConnectionTarget,
    codec: Arc<dyn WsCodec<Message = StreamMessage>>,
    config: WsConfig,
    events: EventSender,
    state: Arc<watch::Sender<SocketState>>,
}

impl SessionCtx {
    fn set_state(&self, state: SocketState) {
        let _ = self.state.send(state);
    }

    fn finish(&self, notify: bool) {
        self.target.release();
        self.set_state(SocketState::Closed);
        if notify {
            let _ = self.events.send(StreamEvent::Closed);
        }
    }
}

async fn supervise(
    socket: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ctx: SessionCtx,
) {
    let mut socket = socket;
    loop {
        match run_session(&mut socket, &mut cmd_rx, &ctx).await {
            SessionEnd::Shutdown { graceful } => {
                if graceful {
                    let _ = socket.close(None).await;
                }
                ctx.finish(true);
                return;
            }
            SessionEnd::ChannelClosed => {
                ctx.finish(false);
                return;
            }
            SessionEnd::Lost(reason) => {
                warn!(reason = %reason, "stream connection lost, reconnecting");
                ctx.set_state(SocketState::Reconnecting);
                drop(socket);
                match reopen(&mut cmd_rx, &ctx).await {
                    Reopen::Connected(next) => {
                        socket = next;
                        ctx.set_state(SocketState::Connected);
                        if ctx.events.send(StreamEvent::Open).is_err() {
                            ctx.finish(false);
                            return;
                        }
                    }
                    Reopen::Shutdown => {
                        ctx.finish(true);
                        return;
                    }
                    Reopen::Failed(error) => {
                        let _ = ctx.events.send(StreamEvent::Error(error.to_string()));
                        ctx.finish(true);
                        return;
                    }
                }
            }
        }
    }
}

/// Drive one open transport until it is lost, stalled, or shut down.
async fn run_session(
    socket: &mut WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ctx: &SessionCtx,
) -> SessionEnd {
    let window = ctx.config.heartbeat_timeout;
    let mut heartbeat = interval_at(Instant::now() + window, window);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut alive = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                return match cmd {
                    Some(Command::Disconnect) => SessionEnd::Shutdown { graceful: true },
                    Some(Command::ForceDisconnect) => SessionEnd::Shutdown { graceful: false },
                    None => SessionEnd::ChannelClosed,
                };
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(message)) => {
                        // Any inbound traffic counts as liveness.
                        alive = true;
                        match message {
                            Message::Ping(data) => {
                                if let Err(error) = socket.send(Message::Pong(data)).await {
                                    return SessionEnd::Lost(format!(
                                        "failed to send pong: {}",
                                        error
                                    ));
                                }
                            }
                            Message::Pong(_) => {}
                            Message::Close(_) => {
                                return SessionEnd::Lost(
                                    "server closed the connection".to_string(),
                                );
                            }
                            other => match ctx.codec.decode_message(other) {
                                Ok(Some(decoded)) => {
                                    if ctx
                                        .events
                                        .send(StreamEvent::Message(decoded))
                                        .is_err()
                                    {
                                        return SessionEnd::ChannelClosed;
                                    }
                                }
                                Ok(None) => {}
                                Err(error) => {
                                    if ctx
                                        .events
                                        .send(StreamEvent::Error(error.to_string()))
                                        .is_err()
                                    {
                                        return SessionEnd::ChannelClosed;
                                    }
                                }
                            },
                        }
                    }
                    Some(Err(error)) => {
                        return SessionEnd::Lost(format!("transport error: {}", error));
                    }
                    None => return SessionEnd::Lost("transport stream ended".to_string()),
                }
            }
            _ = heartbeat.tick() => {
                if alive {
                    // A frame arrived within the window; arm a fresh one.
                    alive = false;
                } else {
                    return SessionEnd::Lost(
                        "heartbeat window elapsed with no inbound frames".to_string(),
                    );
                }
            }
        }
    }
}

/// Re-resolve the target and reopen the transport, honoring the backoff
/// policy and remaining responsive to shutdown commands.
async fn reopen(cmd_rx: &mut mpsc::UnboundedReceiver<Command>, ctx: &SessionCtx) -> Reopen {
    let url = match ctx.target.resolve(&ctx.events).await {
        Ok(url) => url,
        Err(error) => return Reopen::Failed(error),
    };

    let mut backoff = ctx.config.backoff.clone();
    loop {
        match open_transport(&url, ctx.config.connect_timeout).await {
            Ok(socket) => return Reopen::Connected(socket),
            Err(error) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        error = %error,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "reconnect attempt failed"
                    );
                    if ctx
                        .events
                        .send(StreamEvent::Reconnecting {
                            attempt: backoff.attempt(),
                            delay,
                        })
                        .is_err()
                    {
                        return Reopen::Shutdown;
                    }
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cmd_rx.recv() => {
                            // Any command during a reconnect wait means teardown.
                            return Reopen::Shutdown;
                        }
                    }
                }
                None => {
                    return Reopen::Failed(ExchangeError::ReconnectExhausted {
                        attempts: backoff.attempt(),
                    })
                }
            },
        }
    }
}

async fn open_transport(url: &str, timeout: Duration) -> Result<WsStream, ExchangeError> {
    let (socket, _) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
        .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;
    Ok(socket)
}
