use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use airops_shared::{ConversationId, MessageId, UserId};

pub const EVENT_MESSAGE_APPENDED: &str = "message-appended";
pub const EVENT_CONVERSATIONS_CHANGED: &str = "conversations-changed";
pub const EVENT_READ_STAMPED: &str = "read-stamped";
pub const EVENT_REACTION_CHANGED: &str = "reaction-changed";
pub const EVENT_TYPING_CHANGED: &str = "typing-changed";
pub const EVENT_PRESENCE_CHANGED: &str = "presence-changed";
pub const EVENT_PRESENCE_CLEARED: &str = "presence-cleared";
pub const EVENT_EMERGENCY_ALERT: &str = "emergency-alert";
pub const EVENT_CONNECTION_CHANGED: &str = "connection-changed";

/// What changed in the live state, as seen by a UI layer. Carries ids and
/// small values only; the data itself is read back from the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    MessageAppended {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// Some list view was patched or went stale.
    ConversationsChanged,
    #[serde(rename_all = "camelCase")]
    ReadStamped {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    #[serde(rename_all = "camelCase")]
    ReactionChanged { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    TypingChanged {
        conversation_id: ConversationId,
        users: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    PresenceChanged { user_id: UserId, online: bool },
    PresenceCleared,
    EmergencyAlert { payload: Value },
    Connected,
    Disconnected { reason: String },
    #[serde(rename_all = "camelCase")]
    Reconnecting { attempt: u32, delay_ms: u64 },
    ConnectionError { reason: String },
}

impl SessionEvent {
    pub fn reconnecting(attempt: u32, delay: Duration) -> Self {
        Self::Reconnecting {
            attempt,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Channel name a UI bridge would publish this event under.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::MessageAppended { .. } => EVENT_MESSAGE_APPENDED,
            Self::ConversationsChanged => EVENT_CONVERSATIONS_CHANGED,
            Self::ReadStamped { .. } => EVENT_READ_STAMPED,
            Self::ReactionChanged { .. } => EVENT_REACTION_CHANGED,
            Self::TypingChanged { .. } => EVENT_TYPING_CHANGED,
            Self::PresenceChanged { .. } => EVENT_PRESENCE_CHANGED,
            Self::PresenceCleared => EVENT_PRESENCE_CLEARED,
            Self::EmergencyAlert { .. } => EVENT_EMERGENCY_ALERT,
            Self::Connected
            | Self::Disconnected { .. }
            | Self::Reconnecting { .. }
            | Self::ConnectionError { .. } => EVENT_CONNECTION_CHANGED,
        }
    }
}
