//! # airops-cache
//!
//! Client-side state kept consistent with the live event stream.
//!
//! [`QueryCache`] holds the results of conversation-list and message
//! fetches and applies inbound events to them under fixed rules: appends
//! are idempotent by message id and never reorder, list summaries are
//! patched in place and then marked stale so the next refetch restores
//! authoritative unread counts, and events that reference something not
//! yet fetched come back as explicit outcomes instead of errors.
//!
//! [`PresenceTracker`] holds the ephemeral typing and online sets.

pub mod cache;
pub mod conversations;
pub mod messages;
pub mod presence;
pub mod reactions;

pub use cache::QueryCache;
pub use conversations::{ListFetch, ReadAckOutcome, SummaryOutcome};
pub use messages::{AppendOutcome, MergeOutcome, NewMessageOutcome, ReadOutcome};
pub use presence::{PresenceChange, PresenceTracker};
pub use reactions::ReactionOutcome;

#[cfg(test)]
pub(crate) mod fixtures {
    use airops_shared::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, minute, 0).unwrap()
    }

    pub fn message(id: &str, conversation: &str, sender: &str, minute: u32) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new(conversation),
            sender_id: UserId::new(sender),
            content: format!("content of {id}"),
            message_type: MessageType::Text,
            metadata: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
            created_at: at(minute),
            read_at: None,
        }
    }

    pub fn conversation(id: &str, unread: u32) -> Conversation {
        Conversation {
            id: ConversationId::new(id),
            kind: ConversationType::Group,
            name: Some(format!("Group {id}")),
            last_message_at: Some(at(0)),
            last_message_preview: Some("earlier".to_string()),
            member_count: 3,
            members: Vec::new(),
            membership: Some(Membership {
                role: MemberRole::Member,
                unread_count: unread,
                is_muted: false,
            }),
        }
    }
}
