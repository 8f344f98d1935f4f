use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::models::Message;
use crate::types::{ConversationId, MessageId, UserId};

/// A named event as it travels over the socket, before or after typing.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    pub name: String,
    pub payload: Value,
}

impl WireEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Every server event the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    MessageNew(Message),
    MessageRead(ReadReceipt),
    UserTyping(TypingUpdate),
    UserOnline(PresenceUpdate),
    UserOffline(PresenceUpdate),
    ReactionAdded(ReactionDelta),
    ReactionRemoved(ReactionDelta),
    /// Opaque alert body, shown to the operator and never cached.
    EmergencyAlert(Value),
}

/// `message:read` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// `user:typing` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// `user:online` / `user:offline` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: UserId,
}

/// `message:reaction:added` / `message:reaction:removed` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReactionDelta {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

impl InboundEvent {
    /// Decode a wire event. Unknown names yield `Ok(None)` so newer servers
    /// can add events without breaking older clients.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>, ProtocolError> {
        fn parse<T: serde::de::DeserializeOwned>(
            name: &str,
            payload: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload {
                event: name.to_string(),
                source,
            })
        }

        let event = match name {
            EVENT_MESSAGE_NEW => Self::MessageNew(parse(name, payload)?),
            EVENT_MESSAGE_READ => Self::MessageRead(parse(name, payload)?),
            EVENT_USER_TYPING => Self::UserTyping(parse(name, payload)?),
            EVENT_USER_ONLINE => Self::UserOnline(parse(name, payload)?),
            EVENT_USER_OFFLINE => Self::UserOffline(parse(name, payload)?),
            EVENT_REACTION_ADDED => Self::ReactionAdded(parse(name, payload)?),
            EVENT_REACTION_REMOVED => Self::ReactionRemoved(parse(name, payload)?),
            EVENT_EMERGENCY_ALERT => Self::EmergencyAlert(payload),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn decode_wire(event: &WireEvent) -> Result<Option<Self>, ProtocolError> {
        Self::decode(&event.name, event.payload.clone())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageNew(_) => EVENT_MESSAGE_NEW,
            Self::MessageRead(_) => EVENT_MESSAGE_READ,
            Self::UserTyping(_) => EVENT_USER_TYPING,
            Self::UserOnline(_) => EVENT_USER_ONLINE,
            Self::UserOffline(_) => EVENT_USER_OFFLINE,
            Self::ReactionAdded(_) => EVENT_REACTION_ADDED,
            Self::ReactionRemoved(_) => EVENT_REACTION_REMOVED,
            Self::EmergencyAlert(_) => EVENT_EMERGENCY_ALERT,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Every event the client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinConversations(Vec<ConversationId>),
    TypingStart(ConversationId),
    TypingStop(ConversationId),
    MessageRead(ReadNotice),
}

/// Outbound `message:read` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinConversations(_) => EVENT_CONVERSATIONS_JOIN,
            Self::TypingStart(_) => EVENT_TYPING_START,
            Self::TypingStop(_) => EVENT_TYPING_STOP,
            Self::MessageRead(_) => EVENT_MESSAGE_READ,
        }
    }

    pub fn to_wire(&self) -> Result<WireEvent, ProtocolError> {
        let payload = match self {
            Self::JoinConversations(ids) => serde_json::to_value(ids)?,
            Self::TypingStart(id) | Self::TypingStop(id) => serde_json::to_value(id)?,
            Self::MessageRead(notice) => serde_json::to_value(notice)?,
        };
        Ok(WireEvent::new(self.name(), payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_message_read() {
        let event = InboundEvent::decode(
            "message:read",
            json!({"messageId": "m1", "userId": "u2", "readAt": "2026-03-01T09:00:00Z"}),
        )
        .unwrap()
        .unwrap();

        match event {
            InboundEvent::MessageRead(receipt) => {
                assert_eq!(receipt.message_id, MessageId::new("m1"));
                assert_eq!(receipt.user_id, UserId::new("u2"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let decoded = InboundEvent::decode("roster:published", json!({"week": 12})).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_known_event_with_bad_payload_is_an_error() {
        let err = InboundEvent::decode("user:typing", json!({"conversationId": "c1"}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref event, .. } if event == "user:typing"));
    }

    #[test]
    fn test_emergency_alert_is_passed_through() {
        let body = json!({"title": "Runway 2 closed", "severity": "critical"});
        let event = InboundEvent::decode("emergency:alert", body.clone())
            .unwrap()
            .unwrap();
        assert_eq!(event, InboundEvent::EmergencyAlert(body));
        assert_eq!(event.name(), EVENT_EMERGENCY_ALERT);
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let join = OutboundEvent::JoinConversations(vec!["c1".into(), "c2".into()])
            .to_wire()
            .unwrap();
        assert_eq!(join.name, "conversations:join");
        assert_eq!(join.payload, json!(["c1", "c2"]));

        let typing = OutboundEvent::TypingStart("c1".into()).to_wire().unwrap();
        assert_eq!(typing.name, "typing:start");
        assert_eq!(typing.payload, json!("c1"));

        let read = OutboundEvent::MessageRead(ReadNotice {
            message_id: "m9".into(),
            conversation_id: "c1".into(),
        })
        .to_wire()
        .unwrap();
        assert_eq!(read.name, "message:read");
        assert_eq!(read.payload, json!({"messageId": "m9", "conversationId": "c1"}));
    }
}
