//! Engine.IO v4 / Socket.IO v5 text framing
//!
//! Reference: https://socket.io/docs/v4/engine-io-protocol/ and
//! https://socket.io/docs/v4/socket-io-protocol/
//!
//! Every websocket text frame is one Engine.IO packet: a single type digit
//! followed by an optional payload. Engine.IO `message` packets carry a
//! Socket.IO packet:
//!
//! ```text
//! <type>[<namespace>,][<ack id>][<json data>]
//! ```
//!
//! The namespace is omitted for the default namespace `/`. Binary packets
//! are not used by the readings namespace and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Handshake data sent by the server in the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    /// Payload is an encoded Socket.IO packet
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(frame: &str) -> anyhow::Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty Engine.IO packet"))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let open: OpenPayload = serde_json::from_str(body)
                    .map_err(|e| anyhow::anyhow!("Invalid Engine.IO open payload: {}", e))?;
                Ok(EnginePacket::Open(open))
            }
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(anyhow::anyhow!("Unknown Engine.IO packet type: {:?}", other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(open) => format!("0{}", serde_json::json!(open)),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping => "2".to_string(),
            EnginePacket::Pong => "3".to_string(),
            EnginePacket::Message(body) => format!("4{}", body),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketPacketType {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ack = 3,
    ConnectError = 4,
    BinaryEvent = 5,
    BinaryAck = 6,
}

impl TryFrom<char> for SocketPacketType {
    type Error = anyhow::Error;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '0' => Ok(SocketPacketType::Connect),
            '1' => Ok(SocketPacketType::Disconnect),
            '2' => Ok(SocketPacketType::Event),
            '3' => Ok(SocketPacketType::Ack),
            '4' => Ok(SocketPacketType::ConnectError),
            '5' => Ok(SocketPacketType::BinaryEvent),
            '6' => Ok(SocketPacketType::BinaryAck),
            _ => Err(anyhow::anyhow!("Unknown Socket.IO packet type: {:?}", value)),
        }
    }
}

/// Parsed Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketType,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Namespace connect, with the auth object sent in the handshake
    pub fn connect(namespace: &str, auth: Option<Value>) -> Self {
        Self {
            kind: SocketPacketType::Connect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: auth,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self {
            kind: SocketPacketType::Disconnect,
            namespace: namespace.to_string(),
            ack_id: None,
            data: None,
        }
    }

    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Self {
            kind: SocketPacketType::Event,
            namespace: namespace.to_string(),
            ack_id: None,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    pub fn parse(body: &str) -> anyhow::Result<Self> {
        let mut chars = body.chars();
        let kind = SocketPacketType::try_from(
            chars
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty Socket.IO packet"))?,
        )?;
        if matches!(
            kind,
            SocketPacketType::BinaryEvent | SocketPacketType::BinaryAck
        ) {
            anyhow::bail!("Binary Socket.IO packets are not supported");
        }
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let nsp = &rest[..idx];
                    rest = &rest[idx + 1..];
                    nsp.to_string()
                }
                None => {
                    let nsp = rest.to_string();
                    rest = "";
                    nsp
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid ack id: {}", e))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(rest)
                    .map_err(|e| anyhow::anyhow!("Invalid Socket.IO payload: {}", e))?,
            )
        };

        Ok(Self {
            kind,
            namespace,
            ack_id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(char::from(b'0' + self.kind as u8));
        if self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wrap in an Engine.IO message frame
    pub fn to_frame(&self) -> String {
        format!("4{}", self.encode())
    }

    /// Event name and first argument of an EVENT packet
    pub fn event_parts(&self) -> Option<(String, Option<Value>)> {
        if self.kind != SocketPacketType::Event {
            return None;
        }
        let mut args = match &self.data {
            Some(Value::Array(args)) => args.clone().into_iter(),
            _ => return None,
        };
        let name = match args.next() {
            Some(Value::String(name)) => name,
            _ => return None,
        };
        Some((name, args.next()))
    }
}
