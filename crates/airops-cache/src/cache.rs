//! The [`QueryCache`] container.
//!
//! Operations are split by domain across `conversations.rs`,
//! `messages.rs` and `reactions.rs`, each adding an `impl QueryCache` block.

use std::collections::{HashMap, HashSet};

use airops_shared::constants::DEFAULT_PREVIEW_CHARS;
use airops_shared::{Conversation, ConversationId, ConversationQuery, Message, MessageId};

/// A cached conversation-list view.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConversationList {
    pub(crate) conversations: Vec<Conversation>,
    /// Set whenever a live event made the view's unread counts or
    /// membership uncertain; cleared by the next fetch.
    pub(crate) stale: bool,
}

/// A conversation's cached messages, oldest first.
#[derive(Debug, Clone, Default)]
pub(crate) struct MessageSequence {
    pub(crate) messages: Vec<Message>,
    pub(crate) ids: HashSet<MessageId>,
    /// Messages that arrived as events and no fetch has returned yet.
    pub(crate) live: HashSet<MessageId>,
    /// False while the sequence only holds messages that arrived as events.
    pub(crate) fetched: bool,
}

impl MessageSequence {
    pub(crate) fn push(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Clone)]
pub struct QueryCache {
    pub(crate) lists: HashMap<ConversationQuery, ConversationList>,
    pub(crate) details: HashMap<ConversationId, Conversation>,
    pub(crate) sequences: HashMap<ConversationId, MessageSequence>,
    /// Which sequence each cached message lives in; read receipts carry no
    /// conversation id.
    pub(crate) message_index: HashMap<MessageId, ConversationId>,
    /// Bumped whenever a live change touches the list views.
    pub(crate) list_generation: u64,
    pub(crate) preview_chars: usize,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl QueryCache {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            lists: HashMap::new(),
            details: HashMap::new(),
            sequences: HashMap::new(),
            message_index: HashMap::new(),
            list_generation: 0,
            preview_chars,
        }
    }

    /// Whether anything at all is cached for `id`: a list row, a detail
    /// record or a message sequence.
    pub fn is_known_conversation(&self, id: &ConversationId) -> bool {
        self.details.contains_key(id)
            || self.sequences.contains_key(id)
            || self
                .lists
                .values()
                .any(|list| list.conversations.iter().any(|c| &c.id == id))
    }

    /// Every conversation id present in any list view or detail record.
    pub fn known_conversation_ids(&self) -> Vec<ConversationId> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let listed = self.lists.values().flat_map(|l| l.conversations.iter());
        for conversation in listed.chain(self.details.values()) {
            if seen.insert(conversation.id.clone()) {
                ids.push(conversation.id.clone());
            }
        }
        ids
    }
}
