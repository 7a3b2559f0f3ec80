//! Scripted Socket.IO server for transport integration testing.
//!
//! Speaks just enough Engine.IO v4 over a raw WebSocket to complete the
//! connect handshake, then relays frames pushed by the test to every open
//! connection and records everything the client sends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use hms_notify::transport::packet::{EnginePacket, OpenHandshake, SocketPacket, DEFAULT_NAMESPACE};

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    Drop,
}

struct ServerState {
    reject_with: Mutex<Option<String>>,
    silent: Mutex<bool>,
    auths: Mutex<Vec<Value>>,
    received: Mutex<Vec<String>>,
    connections: AtomicUsize,
    commands: broadcast::Sender<Command>,
}

pub struct MockSocketIoServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockSocketIoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock socket.io server");
        let addr = listener.local_addr().expect("local addr");
        let (commands, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            reject_with: Mutex::new(None),
            silent: Mutex::new(false),
            auths: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            commands,
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, accept_state.clone()));
            }
        });

        Self { addr, state, task }
    }

    /// `http://` origin suitable for `ClientConfig::socket_url`.
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Full Engine.IO WebSocket endpoint.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws/socket.io/?EIO=4&transport=websocket", self.addr)
    }

    /// Answer subsequent connects with a `44` connect error.
    pub fn reject_connects(&self, message: impl Into<String>) {
        *self.state.reject_with.lock().unwrap() = Some(message.into());
    }

    /// Accept sockets but never send the Engine.IO open packet.
    pub fn go_silent(&self) {
        *self.state.silent.lock().unwrap() = true;
    }

    /// Send a raw Engine.IO frame to every connected client.
    pub fn send_frame(&self, frame: impl Into<String>) {
        let _ = self.state.commands.send(Command::Send(frame.into()));
    }

    /// Emit a Socket.IO event with a single payload argument.
    pub fn emit(&self, event: &str, payload: Value) {
        self.send_frame(SocketPacket::event(event, vec![payload]).to_frame());
    }

    /// End the Socket.IO session from the server side.
    pub fn disconnect_clients(&self) {
        self.send_frame(
            SocketPacket::Disconnect {
                namespace: DEFAULT_NAMESPACE.to_string(),
            }
            .to_frame(),
        );
    }

    /// Drop every socket without a Socket.IO disconnect.
    pub fn drop_connections(&self) {
        let _ = self.state.commands.send(Command::Drop);
    }

    /// Number of completed Socket.IO handshakes.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Auth payloads received in connect packets, in order.
    pub fn auths(&self) -> Vec<Value> {
        self.state.auths.lock().unwrap().clone()
    }

    /// Text frames received after each handshake.
    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for MockSocketIoServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let silent = *state.silent.lock().unwrap();
    if silent {
        // Hold the socket open until the client gives up.
        while let Some(Ok(_)) = ws.next().await {}
        return;
    }

    let open = EnginePacket::Open(OpenHandshake {
        sid: format!("engine-{}", state.connections.load(Ordering::SeqCst)),
        upgrades: Vec::new(),
        ping_interval: 25_000,
        ping_timeout: 20_000,
        max_payload: Some(1_000_000),
    });
    if ws.send(Message::Text(open.encode())).await.is_err() {
        return;
    }

    // Wait for the client's connect packet.
    let auth = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text) {
                Ok(EnginePacket::Message(body)) => match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Connect { data, .. }) => break data.unwrap_or(Value::Null),
                    _ => continue,
                },
                _ => continue,
            },
            Some(Ok(_)) => continue,
            _ => return,
        }
    };
    state.auths.lock().unwrap().push(auth);

    let rejection = state.reject_with.lock().unwrap().clone();
    if let Some(message) = rejection {
        let reply = SocketPacket::ConnectError {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: json!({ "message": message }),
        };
        let _ = ws.send(Message::Text(reply.to_frame())).await;
        let _ = ws.close(None).await;
        return;
    }

    // Subscribe before acknowledging so nothing sent after the client's
    // connect returns is missed.
    let mut commands = state.commands.subscribe();
    let index = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let ack = SocketPacket::Connect {
        namespace: DEFAULT_NAMESPACE.to_string(),
        data: Some(json!({ "sid": format!("socket-{index}") })),
    };
    if ws.send(Message::Text(ack.to_frame())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Send(frame)) => {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Ok(Command::Drop) | Err(_) => return,
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.received.lock().unwrap().push(text);
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
