//! Ephemeral typing and online state. Never persisted, never refetched,
//! cleared whenever the socket goes down.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::trace;

use airops_shared::{ConversationId, UserId};

/// A change to the presence state worth telling the UI about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Typing(ConversationId),
    Online(UserId),
    Offline(UserId),
    Cleared,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    /// Conversation -> user -> when their last typing start was seen.
    typing: HashMap<ConversationId, HashMap<UserId, Instant>>,
    online: HashSet<UserId>,
    typing_ttl: Option<Duration>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(
            airops_shared::constants::DEFAULT_TYPING_EXPIRY_SECS,
        )))
    }
}

impl PresenceTracker {
    /// `typing_ttl` of `None` keeps typing flags until an explicit stop.
    pub fn new(typing_ttl: Option<Duration>) -> Self {
        Self {
            typing: HashMap::new(),
            online: HashSet::new(),
            typing_ttl,
        }
    }

    pub fn typing_ttl(&self) -> Option<Duration> {
        self.typing_ttl
    }

    /// Returns true if the user was not already marked typing.
    pub fn typing_started(&mut self, conversation: &ConversationId, user: &UserId, now: Instant) -> bool {
        self.typing
            .entry(conversation.clone())
            .or_default()
            .insert(user.clone(), now)
            .is_none()
    }

    /// A stop without a prior start is a no-op and returns false.
    pub fn typing_stopped(&mut self, conversation: &ConversationId, user: &UserId) -> bool {
        let Some(users) = self.typing.get_mut(conversation) else {
            return false;
        };
        let removed = users.remove(user).is_some();
        if users.is_empty() {
            self.typing.remove(conversation);
        }
        removed
    }

    /// Users currently typing in a conversation, sorted for stable display.
    pub fn typing_users(&self, conversation: &ConversationId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .typing
            .get(conversation)
            .map(|u| u.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub fn is_typing(&self, conversation: &ConversationId, user: &UserId) -> bool {
        self.typing
            .get(conversation)
            .map(|u| u.contains_key(user))
            .unwrap_or(false)
    }

    pub fn user_online(&mut self, user: &UserId) -> bool {
        self.online.insert(user.clone())
    }

    pub fn user_offline(&mut self, user: &UserId) -> bool {
        self.online.remove(user)
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.online.iter().cloned().collect();
        users.sort();
        users
    }

    /// Drop typing flags older than the idle window. Returns the
    /// conversations whose typing set changed.
    pub fn expire(&mut self, now: Instant) -> Vec<ConversationId> {
        let Some(ttl) = self.typing_ttl else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        self.typing.retain(|conversation, users| {
            let before = users.len();
            users.retain(|_, started| now.saturating_duration_since(*started) < ttl);
            if users.len() != before {
                trace!(conversation = %conversation, expired = before - users.len(), "Typing flags expired");
                changed.push(conversation.clone());
            }
            !users.is_empty()
        });
        changed.sort();
        changed
    }

    /// Forget everything. Returns false if there was nothing to forget.
    pub fn clear(&mut self) -> bool {
        let had_state = !self.typing.is_empty() || !self.online.is_empty();
        self.typing.clear();
        self.online.clear();
        had_state
    }
}
