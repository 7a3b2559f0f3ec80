use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::packet::{EnginePacket, OpenHandshake, SocketPacket, DEFAULT_NAMESPACE};
use super::{ConnectAuth, LiveTransport, ReconnectPolicy, TransportError, TransportState};
use crate::api::TokenStore;
use crate::bus::event_types::{
    is_lifecycle_event, EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT, EVENT_RECONNECTING,
};
use crate::bus::EventRegistry;
use crate::config::{ClientConfig, ConfigError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket.IO client over a single Engine.IO WebSocket.
pub struct SocketIoTransport {
    endpoint: String,
    connect_timeout: Duration,
    reconnect: ReconnectPolicy,
    events: EventRegistry,
    tokens: Option<TokenStore>,
    state: Arc<Mutex<TransportState>>,
    connection: tokio::sync::Mutex<Option<ConnectionHandle>>,
}

struct ConnectionHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SocketIoTransport {
    pub fn new(config: &ClientConfig, events: EventRegistry) -> Result<Self, ConfigError> {
        let endpoint = websocket_endpoint(&config.socket_origin()?, &config.socket_path);
        Ok(Self::with_endpoint(endpoint, events)
            .with_connect_timeout(config.connect_timeout())
            .with_reconnect_policy(config.reconnect.clone()))
    }

    /// Use a fully-formed `ws://` or `wss://` endpoint as-is.
    pub fn with_endpoint(endpoint: impl Into<String>, events: EventRegistry) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            events,
            tokens: None,
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Re-read the access token from `tokens` before every reconnect attempt,
    /// so a token refreshed by the REST client is the one sent.
    pub fn with_token_source(mut self, tokens: TokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LiveTransport for SocketIoTransport {
    async fn connect(&self, auth: ConnectAuth) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().await;
        if read_state(&self.state).is_active() {
            return Err(TransportError::AlreadyConnected);
        }
        // A previous connection that ended on its own leaves a finished task.
        if let Some(stale) = connection.take() {
            let _ = stale.task.await;
        }

        write_state(&self.state, TransportState::Connecting);
        if auth.token.is_none() {
            warn!(user_id = auth.user_id, "connecting without an access token");
        }
        let auth_value = serde_json::to_value(&auth).map_err(TransportError::protocol)?;

        let session = match handshake(&self.endpoint, &auth_value, self.connect_timeout).await {
            Ok(session) => session,
            Err(e) => {
                error!("socket.io connection to {} failed: {e}", self.endpoint);
                write_state(&self.state, TransportState::Failed);
                self.events
                    .dispatch(EVENT_CONNECT_ERROR, &json!({ "message": e.to_string() }));
                return Err(e);
            }
        };

        info!(
            user_id = auth.user_id,
            sid = %session.sid,
            "connected to {}", self.endpoint
        );
        write_state(&self.state, TransportState::Connected);
        self.events
            .dispatch(EVENT_CONNECT, &json!({ "sid": session.sid }));

        let ctx = ConnectionContext {
            endpoint: self.endpoint.clone(),
            auth,
            tokens: self.tokens.clone(),
            connect_timeout: self.connect_timeout,
            reconnect: self.reconnect.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
        };
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_connection(ctx, session, shutdown_rx));
        *connection = Some(ConnectionHandle { shutdown, task });
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(handle) = self.connection.lock().await.take() else {
            return;
        };
        info!("disconnecting from {}", self.endpoint);
        // The task may already have ended on its own.
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            warn!("socket.io connection task ended abnormally: {e}");
        }
        write_state(&self.state, TransportState::Disconnected);
    }

    fn state(&self) -> TransportState {
        read_state(&self.state)
    }

    fn events(&self) -> &EventRegistry {
        &self.events
    }
}

/// Map an http(s) origin and Socket.IO path to the Engine.IO WebSocket URL.
pub(crate) fn websocket_endpoint(origin: &str, path: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        origin.to_string()
    };
    let path = path.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{origin}{path}/?EIO=4&transport=websocket")
}

fn read_state(state: &Mutex<TransportState>) -> TransportState {
    *state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_state(state: &Mutex<TransportState>, next: TransportState) {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if *guard != next {
        debug!("transport state {} -> {}", *guard, next);
        *guard = next;
    }
}

// ============================================================================
// Handshake
// ============================================================================

struct LiveSession {
    stream: WsStream,
    open: OpenHandshake,
    sid: String,
}

async fn handshake(
    endpoint: &str,
    auth: &Value,
    limit: Duration,
) -> Result<LiveSession, TransportError> {
    timeout(limit, handshake_inner(endpoint, auth))
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

async fn handshake_inner(endpoint: &str, auth: &Value) -> Result<LiveSession, TransportError> {
    let (mut ws, _response) = connect_async(endpoint).await.map_err(|e| {
        TransportError::connection(format!("websocket connect to {endpoint} failed: {e}"))
    })?;

    let open = loop {
        let frame = next_text(&mut ws).await?;
        match EnginePacket::decode(&frame).map_err(TransportError::protocol)? {
            EnginePacket::Open(open) => break open,
            EnginePacket::Noop => continue,
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected engine.io open packet, got {other:?}"
                )))
            }
        }
    };
    debug!(
        sid = %open.sid,
        ping_interval = open.ping_interval,
        ping_timeout = open.ping_timeout,
        "engine.io session opened"
    );

    ws.send(Message::Text(SocketPacket::connect(Some(auth.clone())).to_frame()))
        .await
        .map_err(TransportError::connection)?;

    loop {
        let frame = next_text(&mut ws).await?;
        match EnginePacket::decode(&frame).map_err(TransportError::protocol)? {
            EnginePacket::Ping(data) => {
                ws.send(Message::Text(EnginePacket::Pong(data).encode()))
                    .await
                    .map_err(TransportError::connection)?;
            }
            EnginePacket::Message(body) => {
                match SocketPacket::decode(&body).map_err(TransportError::protocol)? {
                    SocketPacket::Connect { data, .. } => {
                        let sid = data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| open.sid.clone());
                        return Ok(LiveSession {
                            stream: ws,
                            open,
                            sid,
                        });
                    }
                    SocketPacket::ConnectError { data, .. } => {
                        let message = data
                            .get("message")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| data.to_string());
                        return Err(TransportError::Rejected(message));
                    }
                    other => debug!("ignoring packet before connect ack: {other:?}"),
                }
            }
            EnginePacket::Close => {
                return Err(TransportError::Connection(
                    "server closed the session during handshake".to_string(),
                ))
            }
            _ => {}
        }
    }
}

async fn next_text(ws: &mut WsStream) -> Result<String, TransportError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Connection(
                    "websocket closed during handshake".to_string(),
                ))
            }
            Some(Ok(Message::Binary(_))) => {
                return Err(TransportError::Protocol(
                    "unexpected binary frame during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::connection(e)),
        }
    }
}

// ============================================================================
// Connection task
// ============================================================================

struct ConnectionContext {
    endpoint: String,
    auth: ConnectAuth,
    tokens: Option<TokenStore>,
    connect_timeout: Duration,
    reconnect: ReconnectPolicy,
    events: EventRegistry,
    state: Arc<Mutex<TransportState>>,
}

impl ConnectionContext {
    /// Connect payload for the next attempt. The token source wins over
    /// the token given to `connect` once it holds one.
    fn auth_payload(&self) -> Result<Value, TransportError> {
        let mut auth = self.auth.clone();
        if let Some(token) = self.tokens.as_ref().and_then(TokenStore::access_token) {
            auth.token = Some(token);
        }
        serde_json::to_value(&auth).map_err(TransportError::protocol)
    }
}

enum SessionEnd {
    ClientClosed,
    ServerDisconnect,
    Dropped(String),
}

enum FrameAction {
    Continue,
    Reply(String),
    ServerDisconnect,
    Close,
}

async fn run_connection(
    ctx: ConnectionContext,
    mut session: LiveSession,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        match pump(&ctx, session, &mut shutdown).await {
            SessionEnd::ClientClosed => {
                write_state(&ctx.state, TransportState::Disconnected);
                ctx.events
                    .dispatch(EVENT_DISCONNECT, &json!({ "reason": "io client disconnect" }));
                return;
            }
            SessionEnd::ServerDisconnect => {
                info!("server closed the socket.io session");
                write_state(&ctx.state, TransportState::Disconnected);
                ctx.events
                    .dispatch(EVENT_DISCONNECT, &json!({ "reason": "io server disconnect" }));
                return;
            }
            SessionEnd::Dropped(reason) => {
                warn!("socket.io connection lost: {reason}");
                ctx.events
                    .dispatch(EVENT_DISCONNECT, &json!({ "reason": reason }));
                if !ctx.reconnect.is_enabled() {
                    write_state(&ctx.state, TransportState::Failed);
                    return;
                }
                match reconnect(&ctx, &mut shutdown).await {
                    Some(Ok(next)) => {
                        info!(sid = %next.sid, "reconnected to {}", ctx.endpoint);
                        write_state(&ctx.state, TransportState::Connected);
                        ctx.events.dispatch(EVENT_CONNECT, &json!({ "sid": next.sid }));
                        session = next;
                    }
                    Some(Err(e)) => {
                        error!("giving up on {}: {e}", ctx.endpoint);
                        write_state(&ctx.state, TransportState::Failed);
                        ctx.events
                            .dispatch(EVENT_CONNECT_ERROR, &json!({ "message": e.to_string() }));
                        return;
                    }
                    None => {
                        write_state(&ctx.state, TransportState::Disconnected);
                        return;
                    }
                }
            }
        }
    }
}

async fn pump(
    ctx: &ConnectionContext,
    session: LiveSession,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let LiveSession { stream, open, .. } = session;
    let (mut sink, mut stream) = stream.split();
    let silence_limit = Duration::from_millis(open.ping_interval + open.ping_timeout);
    let mut deadline = Instant::now() + silence_limit;

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let disconnect = SocketPacket::Disconnect {
                    namespace: DEFAULT_NAMESPACE.to_string(),
                };
                let _ = sink.send(Message::Text(disconnect.to_frame())).await;
                let _ = sink.close().await;
                return SessionEnd::ClientClosed;
            }
            _ = sleep_until(deadline) => {
                return SessionEnd::Dropped("ping timeout".to_string());
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    deadline = Instant::now() + silence_limit;
                    match handle_frame(&ctx.events, &text) {
                        FrameAction::Continue => {}
                        FrameAction::Reply(reply) => {
                            if let Err(e) = sink.send(Message::Text(reply)).await {
                                return SessionEnd::Dropped(format!("transport error: {e}"));
                            }
                        }
                        FrameAction::ServerDisconnect => return SessionEnd::ServerDisconnect,
                        FrameAction::Close => return SessionEnd::Dropped("transport close".to_string()),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Dropped("transport close".to_string());
                }
                Some(Ok(Message::Binary(_))) => warn!("ignoring binary websocket frame"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(format!("transport error: {e}")),
            },
        }
    }
}

fn handle_frame(events: &EventRegistry, text: &str) -> FrameAction {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("ignoring undecodable engine.io frame: {e}");
            return FrameAction::Continue;
        }
    };

    let body = match packet {
        EnginePacket::Ping(data) => return FrameAction::Reply(EnginePacket::Pong(data).encode()),
        EnginePacket::Close => return FrameAction::Close,
        EnginePacket::Message(body) => body,
        _ => return FrameAction::Continue,
    };

    let packet = match SocketPacket::decode(&body) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("ignoring undecodable socket.io packet: {e}");
            return FrameAction::Continue;
        }
    };

    if packet.namespace() != DEFAULT_NAMESPACE {
        debug!(namespace = packet.namespace(), "ignoring packet for other namespace");
        return FrameAction::Continue;
    }

    match packet {
        SocketPacket::Event {
            name, args, ack_id, ..
        } => {
            if is_lifecycle_event(&name) {
                warn!(event = %name, "server sent a reserved event name; ignoring");
                return FrameAction::Continue;
            }
            let payload = args.into_iter().next().unwrap_or(Value::Null);
            debug!(event = %name, "received server event");
            events.dispatch(&name, &payload);
            match ack_id {
                Some(ack_id) => FrameAction::Reply(
                    SocketPacket::Ack {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                        ack_id,
                        args: Vec::new(),
                    }
                    .to_frame(),
                ),
                None => FrameAction::Continue,
            }
        }
        SocketPacket::Disconnect { .. } => FrameAction::ServerDisconnect,
        SocketPacket::ConnectError { data, .. } => {
            warn!("server reported a connect error mid-session: {data}");
            FrameAction::Continue
        }
        SocketPacket::Connect { .. } | SocketPacket::Ack { .. } => FrameAction::Continue,
    }
}

async fn reconnect(
    ctx: &ConnectionContext,
    shutdown: &mut oneshot::Receiver<()>,
) -> Option<Result<LiveSession, TransportError>> {
    let max_attempts = ctx.reconnect.max_attempts;
    let mut last_error = String::new();

    for attempt in 0..max_attempts {
        write_state(&ctx.state, TransportState::Reconnecting);
        let delay = ctx.reconnect.delay_for(attempt);
        warn!(
            "reconnecting to {} in {:?} (attempt {}/{})",
            ctx.endpoint,
            delay,
            attempt + 1,
            max_attempts
        );
        ctx.events.dispatch(
            EVENT_RECONNECTING,
            &json!({ "attempt": attempt + 1, "delay_ms": delay.as_millis() as u64 }),
        );

        tokio::select! {
            _ = &mut *shutdown => return None,
            _ = sleep(delay) => {}
        }

        let auth = match ctx.auth_payload() {
            Ok(auth) => auth,
            Err(e) => return Some(Err(e)),
        };
        let result = tokio::select! {
            _ = &mut *shutdown => return None,
            result = handshake(&ctx.endpoint, &auth, ctx.connect_timeout) => result,
        };

        match result {
            Ok(session) => return Some(Ok(session)),
            Err(e) if !e.is_retryable() => return Some(Err(e)),
            Err(e) => {
                warn!("reconnect attempt {} failed: {e}", attempt + 1);
                last_error = e.to_string();
            }
        }
    }

    Some(Err(TransportError::ReconnectionFailed {
        attempts: max_attempts,
        last_error,
    }))
}
