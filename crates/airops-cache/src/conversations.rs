//! Conversation-list views and the per-conversation summary they show.

use std::collections::HashSet;

use tracing::debug;

use airops_shared::{Attachment, Conversation, ConversationId, ConversationQuery, Message};

use crate::cache::{ConversationList, QueryCache};

/// What a `message:new` did to the cached list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// The conversation's row was patched in this many views.
    Patched { views: usize },
    /// No view holds the conversation yet; all views were marked stale.
    NotListed,
}

/// What acknowledging a mark-read did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAckOutcome {
    Reset { views: usize },
    NotCached,
}

/// Taken when a list fetch starts; hands the result back to
/// [`QueryCache::complete_list_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFetch {
    generation: u64,
}

impl QueryCache {
    // ------------------------------------------------------------------
    // Fetch results
    // ------------------------------------------------------------------

    pub fn begin_list_fetch(&self) -> ListFetch {
        ListFetch {
            generation: self.list_generation,
        }
    }

    /// Store a list fetch started with [`begin_list_fetch`](Self::begin_list_fetch).
    ///
    /// If live events touched the lists while the request was in flight,
    /// the snapshot may predate them: the newest cached message of each
    /// row is replayed onto it and the view stays stale. Returns whether
    /// that happened.
    pub fn complete_list_fetch(
        &mut self,
        fetch: ListFetch,
        query: ConversationQuery,
        conversations: Vec<Conversation>,
    ) -> bool {
        self.store_conversations(query, conversations);
        if fetch.generation == self.list_generation {
            return false;
        }

        let replayed = self.replay_latest_messages(&query);
        if let Some(list) = self.lists.get_mut(&query) {
            list.stale = true;
        }
        debug!(
            page = query.page,
            kind = ?query.kind,
            replayed,
            "List fetch overlapped live events, keeping it stale"
        );
        true
    }

    /// Replace a list view with a fresh fetch result.
    pub fn store_conversations(&mut self, query: ConversationQuery, conversations: Vec<Conversation>) {
        debug!(
            page = query.page,
            kind = ?query.kind,
            count = conversations.len(),
            "Caching conversation list"
        );
        for conversation in &conversations {
            if let Some(detail) = self.details.get_mut(&conversation.id) {
                *detail = conversation.clone();
            }
        }
        self.lists.insert(
            query,
            ConversationList {
                conversations,
                stale: false,
            },
        );
    }

    /// Cache a single conversation (detail fetch or creation) and refresh
    /// its row wherever it is listed. A conversation no view contains yet
    /// makes every view stale so it shows up on the next refresh.
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        let mut listed = false;
        for list in self.lists.values_mut() {
            if let Some(row) = list
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation.id)
            {
                *row = conversation.clone();
                listed = true;
            }
        }
        if !listed {
            self.invalidate_conversations();
        }
        self.details.insert(conversation.id.clone(), conversation);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn conversations(&self, query: &ConversationQuery) -> Option<&[Conversation]> {
        self.lists.get(query).map(|l| l.conversations.as_slice())
    }

    /// Latest cached copy of a conversation, detail record first.
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.details.get(id).or_else(|| {
            self.lists
                .values()
                .flat_map(|l| l.conversations.iter())
                .find(|c| &c.id == id)
        })
    }

    /// `None` when the view was never fetched.
    pub fn is_stale(&self, query: &ConversationQuery) -> Option<bool> {
        self.lists.get(query).map(|l| l.stale)
    }

    pub fn stale_queries(&self) -> Vec<ConversationQuery> {
        self.lists
            .iter()
            .filter(|(_, list)| list.stale)
            .map(|(query, _)| *query)
            .collect()
    }

    pub fn invalidate_conversations(&mut self) {
        self.list_generation += 1;
        for list in self.lists.values_mut() {
            list.stale = true;
        }
    }

    /// Bring rows of a freshly stored view up to the newest message cached
    /// for them. Returns how many rows moved.
    fn replay_latest_messages(&mut self, query: &ConversationQuery) -> usize {
        let Some(list) = self.lists.get_mut(query) else {
            return 0;
        };

        let mut bumped = HashSet::new();
        for row in list.conversations.iter_mut() {
            let Some(latest) = self
                .sequences
                .get(&row.id)
                .and_then(|s| s.messages.iter().max_by_key(|m| m.created_at))
            else {
                continue;
            };
            if row.last_message_at.is_some_and(|at| at >= latest.created_at) {
                continue;
            }
            let preview = preview_text(&latest.content, &latest.attachments, self.preview_chars);
            apply_bump(row, latest, &preview);
            if let Some(detail) = self.details.get_mut(&row.id) {
                apply_bump(detail, latest, &preview);
            }
            bumped.insert(row.id.clone());
        }
        if bumped.is_empty() {
            return 0;
        }

        let (mut moved, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut list.conversations)
            .into_iter()
            .partition(|c| bumped.contains(&c.id));
        moved.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        moved.extend(rest);
        list.conversations = moved;
        bumped.len()
    }

    // ------------------------------------------------------------------
    // Live patches
    // ------------------------------------------------------------------

    /// Reflect a new message in every view showing its conversation: bump
    /// `lastMessageAt` and the preview, move the row to the top. The unread
    /// count is left alone; the views are marked stale so the backend's
    /// count wins on the next refresh.
    pub(crate) fn bump_summary(&mut self, message: &Message) -> SummaryOutcome {
        let preview = preview_text(&message.content, &message.attachments, self.preview_chars);
        let mut views = 0;
        self.list_generation += 1;

        for list in self.lists.values_mut() {
            list.stale = true;
            let Some(pos) = list
                .conversations
                .iter()
                .position(|c| c.id == message.conversation_id)
            else {
                continue;
            };
            let mut row = list.conversations.remove(pos);
            apply_bump(&mut row, message, &preview);
            list.conversations.insert(0, row);
            views += 1;
        }

        if let Some(detail) = self.details.get_mut(&message.conversation_id) {
            apply_bump(detail, message, &preview);
        }

        if views == 0 {
            debug!(conversation = %message.conversation_id, "New message for unlisted conversation");
            SummaryOutcome::NotListed
        } else {
            SummaryOutcome::Patched { views }
        }
    }

    /// The backend acknowledged a mark-read: the conversation has no unread
    /// messages for this user any more.
    pub fn acknowledge_read(&mut self, id: &ConversationId) -> ReadAckOutcome {
        let mut views = 0;
        self.list_generation += 1;
        for list in self.lists.values_mut() {
            if let Some(row) = list.conversations.iter_mut().find(|c| &c.id == id) {
                reset_unread(row);
                list.stale = true;
                views += 1;
            }
        }
        let detail = match self.details.get_mut(id) {
            Some(detail) => {
                reset_unread(detail);
                true
            }
            None => false,
        };

        if views == 0 && !detail {
            ReadAckOutcome::NotCached
        } else {
            ReadAckOutcome::Reset { views }
        }
    }
}

fn apply_bump(row: &mut Conversation, message: &Message, preview: &str) {
    // Out-of-order delivery must not move the summary backwards.
    if row
        .last_message_at
        .map(|at| at > message.created_at)
        .unwrap_or(false)
    {
        return;
    }
    row.last_message_at = Some(message.created_at);
    row.last_message_preview = Some(preview.to_string());
}

fn reset_unread(row: &mut Conversation) {
    if let Some(membership) = row.membership.as_mut() {
        membership.unread_count = 0;
    }
}

/// Single-line preview of a message for list rows.
pub fn preview_text(content: &str, attachments: &[Attachment], max_chars: usize) -> String {
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.is_empty() {
        return match attachments.first() {
            Some(file) => format!("Attachment: {}", file.file_name),
            None => String::new(),
        };
    }
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut truncated: String = flattened.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}
