//! Conversation and message records as served by the messaging backend.
//!
//! Field names follow the backend's camelCase JSON so the same structs are
//! used for REST responses and socket payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, ConversationType, MessageId, MessageType, UserId};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A channel grouping messages between a fixed set of participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    /// Explicit name. Only group and emergency conversations carry one.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub members: Vec<ConversationMember>,
    /// The requesting user's own membership row.
    #[serde(default)]
    pub membership: Option<Membership>,
}

impl Conversation {
    /// Name shown in conversation lists.
    ///
    /// Direct conversations are named after the counterpart; group and
    /// emergency conversations use their explicit name and fall back to the
    /// member list when none is set.
    pub fn display_name(&self, self_id: &UserId) -> String {
        match self.kind {
            ConversationType::Direct => self
                .members
                .iter()
                .find(|m| &m.user_id != self_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            ConversationType::Group | ConversationType::Emergency => {
                if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
                    return name.clone();
                }
                let names: Vec<&str> = self
                    .members
                    .iter()
                    .filter(|m| &m.user_id != self_id)
                    .map(|m| m.display_name.as_str())
                    .collect();
                if names.is_empty() {
                    "Unnamed group".to_string()
                } else {
                    names.join(", ")
                }
            }
        }
    }

    pub fn unread_count(&self) -> u32 {
        self.membership.as_ref().map(|m| m.unread_count).unwrap_or(0)
    }
}

/// One conversation-list view: a page, optionally filtered by type.
///
/// Also the cache key for that view, so two screens showing the same page
/// share one cached list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationQuery {
    pub kind: Option<ConversationType>,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for ConversationQuery {
    fn default() -> Self {
        Self {
            kind: None,
            page: 1,
            limit: 20,
        }
    }
}

impl ConversationQuery {
    pub fn of_kind(kind: ConversationType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMember {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(default)]
    pub role: MemberRole,
    /// Unsigned, so the `>= 0` invariant holds by construction.
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_muted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    /// Shift-handover details; only set on `handover` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HandoverMetadata>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HandoverMetadata {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub passengers: Option<u32>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
}

// ---------------------------------------------------------------------------
// User directory
// ---------------------------------------------------------------------------

/// Result row of the backend's user search, used to start conversations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl UserSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
