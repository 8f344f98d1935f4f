//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the text subset the messaging backend uses is supported: the
//! Engine.IO control packets, and Socket.IO CONNECT / DISCONNECT / EVENT /
//! ACK / CONNECT_ERROR without binary attachments.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                    ping / pong
//! 40{"token":".."}                                         socket connect
//! 42["message:new",{..}]                                   socket event
//! 44{"message":"unauthorized"}                             connect error
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use airops_shared::protocol::WireEvent;
use airops_shared::ProtocolError;

/// Namespace every airops event travels on.
pub const ROOT_NAMESPACE: &str = "/";

/// Engine.IO OPEN payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
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
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        namespace: String,
        ack: Option<u64>,
        event: WireEvent,
    },
    Ack {
        id: u64,
        args: Value,
    },
    ConnectError(Value),
}

impl SocketPacket {
    /// Event on the root namespace without an acknowledgement id.
    pub fn event(event: WireEvent) -> Self {
        Self::Event {
            namespace: ROOT_NAMESPACE.to_string(),
            ack: None,
            event,
        }
    }

    fn encode(&self) -> String {
        match self {
            Self::Connect(None) => "0".to_string(),
            Self::Connect(Some(auth)) => format!("0{auth}"),
            Self::Disconnect => "1".to_string(),
            Self::Event {
                namespace,
                ack,
                event,
            } => {
                let mut out = String::from("2");
                if namespace != ROOT_NAMESPACE {
                    out.push_str(namespace);
                    out.push(',');
                }
                if let Some(id) = ack {
                    out.push_str(&id.to_string());
                }
                let args = Value::Array(vec![
                    Value::String(event.name.clone()),
                    event.payload.clone(),
                ]);
                out.push_str(&args.to_string());
                out
            }
            Self::Ack { id, args } => format!("3{id}{args}"),
            Self::ConnectError(body) => format!("4{body}"),
        }
    }

    fn decode(text: &str) -> Result<Self, ProtocolError> {
        let kind = leading_digit(text)?;
        let mut rest = &text[1..];

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            ROOT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| malformed(format!("ack id: {e}")))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        match kind {
            b'0' => {
                if rest.is_empty() {
                    Ok(Self::Connect(None))
                } else {
                    Ok(Self::Connect(Some(serde_json::from_str(rest)?)))
                }
            }
            b'1' => Ok(Self::Disconnect),
            b'2' => {
                let args: Vec<Value> = serde_json::from_str(rest)?;
                let mut args = args.into_iter();
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(malformed("event packet without a name")),
                };
                let payload = args.next().unwrap_or(Value::Null);
                Ok(Self::Event {
                    namespace,
                    ack,
                    event: WireEvent::new(name, payload),
                })
            }
            b'3' => Ok(Self::Ack {
                id: ack.ok_or_else(|| malformed("ack packet without an id"))?,
                args: serde_json::from_str(rest)?,
            }),
            b'4' => Ok(Self::ConnectError(
                serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string())),
            )),
            b'5' | b'6' => Err(malformed("binary packets are not supported")),
            other => Err(malformed(format!(
                "unknown socket packet type '{}'",
                other as char
            ))),
        }
    }
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(packet) => format!("4{}", packet.encode()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let kind = leading_digit(text)?;
        let rest = &text[1..];
        match kind {
            b'0' => Ok(Self::Open(serde_json::from_str(rest)?)),
            b'1' => Ok(Self::Close),
            b'2' => Ok(Self::Ping(rest.to_string())),
            b'3' => Ok(Self::Pong(rest.to_string())),
            b'4' => Ok(Self::Message(SocketPacket::decode(rest)?)),
            b'5' => Ok(Self::Upgrade),
            b'6' => Ok(Self::Noop),
            other => Err(malformed(format!(
                "unknown engine packet type '{}'",
                other as char
            ))),
        }
    }
}

/// Human-readable reason from a CONNECT_ERROR body.
pub fn connect_error_reason(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        other => other.to_string(),
    }
}

fn leading_digit(text: &str) -> Result<u8, ProtocolError> {
    match text.as_bytes().first() {
        Some(b) if b.is_ascii_digit() => Ok(*b),
        Some(_) => Err(malformed("packet does not start with a type digit")),
        None => Err(malformed("empty packet")),
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedPacket(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(open) => {
                assert_eq!(open.sid, "abc");
                assert_eq!(open.ping_interval, 25000);
                assert_eq!(open.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_ping_is_answered_with_matching_pong() {
        let ping = EnginePacket::decode("2").unwrap();
        assert_eq!(ping, EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::Pong("probe".into()).encode(), "3probe");
    }

    #[test]
    fn test_connect_with_auth() {
        let packet = EnginePacket::Message(SocketPacket::Connect(Some(json!({"token": "t0k"}))));
        assert_eq!(packet.encode(), r#"40{"token":"t0k"}"#);

        let ack = EnginePacket::decode(r#"40{"sid":"xyz"}"#).unwrap();
        assert!(matches!(ack, EnginePacket::Message(SocketPacket::Connect(Some(_)))));
    }

    #[test]
    fn test_event_encoding() {
        let packet = EnginePacket::Message(SocketPacket::event(WireEvent::new(
            "typing:start",
            json!("c1"),
        )));
        assert_eq!(packet.encode(), r#"42["typing:start","c1"]"#);
    }

    #[test]
    fn test_event_decoding_with_namespace_and_ack() {
        let packet = EnginePacket::decode(r#"42/admin,17["user:online",{"userId":"u1"}]"#).unwrap();
        match packet {
            EnginePacket::Message(SocketPacket::Event {
                namespace,
                ack,
                event,
            }) => {
                assert_eq!(namespace, "/admin");
                assert_eq!(ack, Some(17));
                assert_eq!(event.name, "user:online");
                assert_eq!(event.payload, json!({"userId": "u1"}));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_event_without_payload_has_null_payload() {
        let packet = EnginePacket::decode(r#"42["ping:server"]"#).unwrap();
        match packet {
            EnginePacket::Message(SocketPacket::Event { event, .. }) => {
                assert_eq!(event.payload, Value::Null)
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_connect_error_reason() {
        let packet = EnginePacket::decode(r#"44{"message":"Authentication error"}"#).unwrap();
        match packet {
            EnginePacket::Message(SocketPacket::ConnectError(body)) => {
                assert_eq!(connect_error_reason(&body), "Authentication error")
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("x42").is_err());
        assert!(EnginePacket::decode("45[]").is_err());
        assert!(EnginePacket::decode(r#"42[17]"#).is_err());
    }
}
