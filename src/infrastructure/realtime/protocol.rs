//! Engine.IO v4 / Socket.IO v5 framing.
//!
//! Only the text framing used over a websocket-only transport is supported.
//! Binary events and acks are rejected.
//!
//! ```text
//! engine:  <type digit><data>            0 open, 1 close, 2 ping, 3 pong, 4 message, 5 upgrade, 6 noop
//! socket:  <type digit>[/nsp,][ack id][json]
//!          0 connect, 1 disconnect, 2 event, 3 ack, 4 connect_error
//! ```

use serde::Deserialize;
use serde_json::Value;

/// Default namespace.
pub const ROOT_NAMESPACE: &str = "/";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownType(char),

    #[error("unsupported packet type {0}")]
    Unsupported(char),

    #[error("invalid ack id")]
    InvalidAckId,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::InvalidPayload(e.to_string())
    }
}

/// Server handshake carried by the engine `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
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
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let data = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(data)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    /// `data[0]` is the event name.
    Event {
        namespace: String,
        id: Option<u64>,
        data: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Event on the root namespace.
    pub fn event(name: &str, args: Vec<Value>, id: Option<u64>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(name.to_string()));
        data.extend(args);
        Self::Event {
            namespace: ROOT_NAMESPACE.to_string(),
            id,
            data,
        }
    }

    pub fn ack(id: u64, args: Vec<Value>) -> Self {
        Self::Ack {
            namespace: ROOT_NAMESPACE.to_string(),
            id,
            data: args,
        }
    }

    pub fn connect(auth: Option<Value>) -> Self {
        Self::Connect {
            namespace: ROOT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: ROOT_NAMESPACE.to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        if matches!(kind, '5' | '6') {
            return Err(ProtocolError::Unsupported(kind));
        }
        let rest = chars.as_str();

        let (namespace, rest) = if rest.starts_with('/') {
            match rest.find(',') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, ""),
            }
        } else {
            (ROOT_NAMESPACE, rest)
        };
        let namespace = namespace.to_string();

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidAckId)?,
            )
        } else {
            None
        };
        let payload = &rest[digits..];
        let data: Option<Value> = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str(payload)?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => match data {
                Some(Value::Array(items)) if matches!(items.first(), Some(Value::String(_))) => {
                    Ok(Self::Event {
                        namespace,
                        id,
                        data: items,
                    })
                }
                _ => Err(ProtocolError::InvalidPayload(
                    "event payload must be an array starting with the event name".into(),
                )),
            },
            '3' => {
                let id = id.ok_or(ProtocolError::InvalidAckId)?;
                let data = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(Self::Ack {
                    namespace,
                    id,
                    data,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace, id, payload) = match self {
            Self::Connect { namespace, data } => ('0', namespace, None, data.clone()),
            Self::Disconnect { namespace } => ('1', namespace, None, None),
            Self::Event {
                namespace,
                id,
                data,
            } => ('2', namespace, *id, Some(Value::Array(data.clone()))),
            Self::Ack {
                namespace,
                id,
                data,
            } => ('3', namespace, Some(*id), Some(Value::Array(data.clone()))),
            Self::ConnectError { namespace, data } => ('4', namespace, None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        if namespace != ROOT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(payload) = payload {
            out.push_str(&payload.to_string());
        }
        out
    }

    /// Split an event into its name and arguments.
    pub fn into_event(self) -> Option<(String, Vec<Value>, Option<u64>)> {
        match self {
            Self::Event { mut data, id, .. } if !data.is_empty() => match data.remove(0) {
                Value::String(name) => Some((name, data, id)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Frame a socket packet inside an engine message.
pub fn frame(packet: &SocketPacket) -> String {
    EnginePacket::Message(packet.encode()).encode()
}
