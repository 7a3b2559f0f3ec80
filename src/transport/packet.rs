//! Engine.IO v4 and Socket.IO v5 text packet codec.
//!
//! An Engine.IO frame is a single type digit followed by its payload. The
//! Engine.IO `message` payload carries one Socket.IO packet:
//!
//! ```text
//! <type>[/<namespace>,][<ack id>][<json>]
//! ```
//!
//! Binary packets (Socket.IO types 5 and 6) are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },
    #[error("binary packets are not supported")]
    Binary,
    #[error("invalid packet payload: {0}")]
    InvalidPayload(String),
}

// ============================================================================
// Engine.IO
// ============================================================================

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(|e| PacketError::InvalidPayload(format!("open handshake: {e}"))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownType {
                layer: "engine.io",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // OpenHandshake only holds strings and integers.
                let body = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{body}")
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

// ============================================================================
// Socket.IO
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// Connect to the default namespace with an auth payload.
    pub fn connect(auth: Option<Value>) -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    /// An event on the default namespace.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.into(),
            args,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn decode(payload: &str) -> Result<Self, PacketError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        if kind == '5' || kind == '6' {
            return Err(PacketError::Binary);
        }

        let (namespace, rest) = split_namespace(rest);
        let (ack_id, body) = split_ack_id(rest);
        let data = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(body)
                    .map_err(|e| PacketError::InvalidPayload(e.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(PacketError::InvalidPayload(
                            "event payload must be a JSON array".to_string(),
                        ))
                    }
                };
                if args.is_empty() {
                    return Err(PacketError::InvalidPayload(
                        "event payload is missing the event name".to_string(),
                    ));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(PacketError::InvalidPayload(format!(
                            "event name must be a string, got {other}"
                        )))
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or_else(|| {
                    PacketError::InvalidPayload("ack packet without id".to_string())
                })?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                data: data.unwrap_or(Value::Null),
            }),
            other => Err(PacketError::UnknownType {
                layer: "socket.io",
                kind: other,
            }),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace) = match self {
            SocketPacket::Connect { namespace, .. } => ('0', namespace),
            SocketPacket::Disconnect { namespace } => ('1', namespace),
            SocketPacket::Event { namespace, .. } => ('2', namespace),
            SocketPacket::Ack { namespace, .. } => ('3', namespace),
            SocketPacket::ConnectError { namespace, .. } => ('4', namespace),
        };

        let mut out = String::new();
        out.push(kind);
        if namespace != DEFAULT_NAMESPACE && !namespace.is_empty() {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            SocketPacket::Connect { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
            }
            SocketPacket::Disconnect { .. } => {}
            SocketPacket::Event {
                ack_id, name, args, ..
            } => {
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
            }
            SocketPacket::Ack { ack_id, args, .. } => {
                out.push_str(&ack_id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
            SocketPacket::ConnectError { data, .. } => out.push_str(&data.to_string()),
        }
        out
    }

    /// The Engine.IO frame carrying this packet.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), rest)
    }
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return (None, rest);
    }
    (rest[..digits].parse().ok(), &rest[digits..])
}
