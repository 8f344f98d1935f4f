use tracing::{debug, warn};

use airops_shared::protocol::ReadReceipt;
use airops_shared::{ConversationId, Message, MessageId};

use crate::cache::{MessageSequence, QueryCache};
use crate::conversations::SummaryOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Added at the tail. `created_sequence` is true when this message
    /// started a sequence for a conversation that was never fetched.
    Appended { created_sequence: bool },
    /// Already cached; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMessageOutcome {
    pub append: AppendOutcome,
    /// `None` for duplicates, which leave the lists alone.
    pub summary: Option<SummaryOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub fetched: usize,
    /// Earlier fetched history outside the returned page, kept ahead of it.
    pub history: usize,
    /// Messages already cached (from events) that the fetch did not contain.
    pub retained: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Stamped,
    AlreadyRead,
    /// The reader wrote the message; their own read does not count.
    OwnMessage,
    /// The message has not been fetched yet; the receipt is dropped.
    UnknownMessage,
}

impl QueryCache {
    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn messages(&self, conversation_id: &ConversationId) -> Option<&[Message]> {
        self.sequences
            .get(conversation_id)
            .map(|s| s.messages.as_slice())
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        let conversation_id = self.message_index.get(id)?;
        self.sequences
            .get(conversation_id)?
            .messages
            .iter()
            .find(|m| &m.id == id)
    }

    pub fn latest_message(&self, conversation_id: &ConversationId) -> Option<&Message> {
        self.sequences.get(conversation_id)?.messages.last()
    }

    /// Whether the sequence has been populated by a fetch, as opposed to
    /// holding only messages that arrived as events.
    pub fn is_fetched(&self, conversation_id: &ConversationId) -> bool {
        self.sequences
            .get(conversation_id)
            .map(|s| s.fetched)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Append rule
    // ------------------------------------------------------------------

    /// Append a message to its conversation's sequence unless a message
    /// with the same id is already there.
    pub fn append_message(&mut self, message: Message) -> AppendOutcome {
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();

        let created_sequence = !self.sequences.contains_key(&conversation_id);
        let sequence = self.sequences.entry(conversation_id.clone()).or_default();
        if !sequence.push(message) {
            debug!(message = %message_id, conversation = %conversation_id, "Duplicate message ignored");
            return AppendOutcome::Duplicate;
        }

        sequence.live.insert(message_id.clone());
        self.message_index.insert(message_id, conversation_id);
        AppendOutcome::Appended { created_sequence }
    }

    /// Full `message:new` handling: append, then bump the list summaries.
    /// A duplicate delivery changes nothing.
    pub fn apply_new_message(&mut self, message: Message) -> NewMessageOutcome {
        let summary_source = message.clone();
        let append = self.append_message(message);
        let summary = match append {
            AppendOutcome::Appended { .. } => Some(self.bump_summary(&summary_source)),
            AppendOutcome::Duplicate => None,
        };
        NewMessageOutcome { append, summary }
    }

    // ------------------------------------------------------------------
    // Fetch merge
    // ------------------------------------------------------------------

    /// Populate a sequence from a fetch (oldest first).
    ///
    /// The result is laid out as:
    /// 1. previously fetched messages older than the page, in cached order;
    /// 2. the page, in fetch order;
    /// 3. messages whose event raced ahead of the fetch and that the page
    ///    does not include, in arrival order.
    ///
    /// Cached non-event messages that fall inside the page's window but are
    /// missing from it are dropped; the backend is authoritative there.
    /// Applying the fetch before or after a racing event therefore ends in
    /// the same sequence, and refetching the newest page never moves older
    /// history.
    pub fn merge_fetched_messages(
        &mut self,
        conversation_id: &ConversationId,
        fetched: Vec<Message>,
    ) -> MergeOutcome {
        let previous = self.sequences.remove(conversation_id).unwrap_or_default();

        let mut page = MessageSequence::default();
        for mut message in fetched {
            if &message.conversation_id != conversation_id {
                warn!(
                    message = %message.id,
                    expected = %conversation_id,
                    actual = %message.conversation_id,
                    "Fetched message belongs to another conversation, skipping"
                );
                continue;
            }
            // Keep read stamps that arrived by event before the fetch caught up.
            if message.read_at.is_none() {
                if let Some(cached) = previous.messages.iter().find(|m| m.id == message.id) {
                    message.read_at = cached.read_at;
                }
            }
            page.push(message);
        }
        let fetched_count = page.messages.len();

        let mut merged = MessageSequence {
            fetched: true,
            ..MessageSequence::default()
        };
        let mut raced = Vec::new();
        let mut reached_page = false;
        for message in previous.messages {
            if page.ids.contains(&message.id) {
                if !previous.live.contains(&message.id) {
                    reached_page = true;
                }
                continue;
            }
            if previous.live.contains(&message.id) {
                raced.push(message);
            } else if !reached_page {
                merged.push(message);
            }
        }
        let history = merged.messages.len();
        let retained = raced.len();

        for message in page.messages {
            merged.push(message);
        }
        for message in raced {
            merged.live.insert(message.id.clone());
            merged.push(message);
        }

        for id in &previous.ids {
            if !merged.ids.contains(id) {
                self.message_index.remove(id);
            }
        }
        for id in &merged.ids {
            self.message_index
                .insert(id.clone(), conversation_id.clone());
        }

        debug!(
            conversation = %conversation_id,
            fetched = fetched_count,
            history,
            retained,
            "Merged fetched messages"
        );
        self.sequences.insert(conversation_id.clone(), merged);
        MergeOutcome {
            fetched: fetched_count,
            history,
            retained,
        }
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    /// Stamp `readAt` on a message when a counterpart reads it. Unread
    /// counters are not touched here; the list views go stale and the
    /// backend's counts are picked up on the next refresh.
    pub fn apply_read_receipt(&mut self, receipt: &ReadReceipt) -> ReadOutcome {
        let Some(conversation_id) = self.message_index.get(&receipt.message_id).cloned() else {
            debug!(message = %receipt.message_id, "Read receipt for unknown message dropped");
            return ReadOutcome::UnknownMessage;
        };
        let Some(message) = self
            .sequences
            .get_mut(&conversation_id)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == receipt.message_id))
        else {
            return ReadOutcome::UnknownMessage;
        };

        if message.sender_id == receipt.user_id {
            return ReadOutcome::OwnMessage;
        }
        if message.read_at.is_some() {
            return ReadOutcome::AlreadyRead;
        }

        message.read_at = Some(receipt.read_at);
        self.invalidate_conversations();
        ReadOutcome::Stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use airops_shared::ConversationQuery;

    fn ids(cache: &QueryCache, conversation: &str) -> Vec<String> {
        cache
            .messages(&conversation.into())
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.to_string())
            .collect()
    }

    #[test]
    fn test_repeated_delivery_yields_one_copy() {
        let mut cache = QueryCache::default();
        let msg = message("m1", "c1", "u2", 1);

        assert_eq!(
            cache.append_message(msg.clone()),
            AppendOutcome::Appended {
                created_sequence: true
            }
        );
        for _ in 0..3 {
            assert_eq!(cache.append_message(msg.clone()), AppendOutcome::Duplicate);
        }
        assert_eq!(ids(&cache, "c1"), vec!["m1"]);
    }

    #[test]
    fn test_appends_keep_processing_order() {
        let mut cache = QueryCache::default();
        // Later timestamp processed first: arrival order wins, no re-sorting.
        cache.append_message(message("b", "c1", "u2", 50));
        cache.append_message(message("a", "c1", "u3", 10));
        cache.append_message(message("c", "c1", "u2", 30));
        assert_eq!(ids(&cache, "c1"), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_fetch_then_event_dedups() {
        let mut cache = QueryCache::default();
        let m1 = message("m1", "c1", "u2", 1);

        cache.merge_fetched_messages(&"c1".into(), vec![m1.clone()]);
        let outcome = cache.apply_new_message(m1);

        assert_eq!(outcome.append, AppendOutcome::Duplicate);
        assert_eq!(outcome.summary, None);
        assert_eq!(ids(&cache, "c1"), vec!["m1"]);
    }

    #[test]
    fn test_event_then_fetch_dedups() {
        let mut cache = QueryCache::default();
        let m1 = message("m1", "c1", "u2", 1);

        cache.apply_new_message(m1.clone());
        assert!(!cache.is_fetched(&"c1".into()));
        let outcome = cache.merge_fetched_messages(&"c1".into(), vec![m1]);

        assert_eq!(
            outcome,
            MergeOutcome {
                fetched: 1,
                history: 0,
                retained: 0
            }
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1"]);
        assert!(cache.is_fetched(&"c1".into()));
    }

    #[test]
    fn test_event_ahead_of_fetch_is_kept_after_fetched_history() {
        let mut cache = QueryCache::default();
        cache.apply_new_message(message("m3", "c1", "u2", 3));

        let outcome = cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m1", "c1", "u2", 1), message("m2", "c1", "u3", 2)],
        );
        assert_eq!(
            outcome,
            MergeOutcome {
                fetched: 2,
                history: 0,
                retained: 1
            }
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1", "m2", "m3"]);
        assert!(cache.message(&"m3".into()).is_some());
    }

    #[test]
    fn test_refetch_after_live_append_keeps_older_history_first() {
        let mut cache = QueryCache::default();
        cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m1", "c1", "u2", 1), message("m2", "c1", "u3", 2)],
        );
        cache.apply_new_message(message("m3", "c1", "u2", 3));

        // Newest page only: m1 has scrolled out of the window.
        let outcome = cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m2", "c1", "u3", 2), message("m3", "c1", "u2", 3)],
        );
        assert_eq!(
            outcome,
            MergeOutcome {
                fetched: 2,
                history: 1,
                retained: 0
            }
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1", "m2", "m3"]);
        assert!(cache.message(&"m1".into()).is_some());

        // Once fetched, m3 is ordinary history for the next refetch.
        cache.apply_new_message(message("m4", "c1", "u3", 4));
        cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m3", "c1", "u2", 3), message("m4", "c1", "u3", 4)],
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_refetch_keeps_events_the_page_has_not_caught_up_with() {
        let mut cache = QueryCache::default();
        cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m1", "c1", "u2", 1), message("m2", "c1", "u3", 2)],
        );
        cache.apply_new_message(message("m4", "c1", "u2", 4));

        let outcome = cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m2", "c1", "u3", 2), message("m3", "c1", "u2", 3)],
        );
        assert_eq!(
            outcome,
            MergeOutcome {
                fetched: 2,
                history: 1,
                retained: 1
            }
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_refetch_drops_messages_missing_inside_the_page() {
        let mut cache = QueryCache::default();
        cache.merge_fetched_messages(
            &"c1".into(),
            vec![
                message("m1", "c1", "u2", 1),
                message("m2", "c1", "u3", 2),
                message("m3", "c1", "u2", 3),
            ],
        );
        cache.merge_fetched_messages(
            &"c1".into(),
            vec![message("m1", "c1", "u2", 1), message("m3", "c1", "u2", 3)],
        );
        assert_eq!(ids(&cache, "c1"), vec!["m1", "m3"]);
        assert!(cache.message(&"m2".into()).is_none());
    }

    #[test]
    fn test_merge_skips_foreign_and_duplicate_rows() {
        let mut cache = QueryCache::default();
        let outcome = cache.merge_fetched_messages(
            &"c1".into(),
            vec![
                message("m1", "c1", "u2", 1),
                message("m1", "c1", "u2", 1),
                message("mx", "c2", "u2", 2),
            ],
        );
        assert_eq!(outcome.fetched, 1);
        assert_eq!(ids(&cache, "c1"), vec!["m1"]);
        assert!(cache.message(&"mx".into()).is_none());
    }

    #[test]
    fn test_read_receipt_stamps_counterpart_reads_once() {
        let mut cache = QueryCache::default();
        cache.store_conversations(ConversationQuery::default(), vec![conversation("c1", 1)]);
        cache.merge_fetched_messages(&"c1".into(), vec![message("m1", "c1", "me", 1)]);

        let own = ReadReceipt {
            message_id: "m1".into(),
            user_id: "me".into(),
            read_at: at(2),
        };
        assert_eq!(cache.apply_read_receipt(&own), ReadOutcome::OwnMessage);
        assert!(cache.message(&"m1".into()).unwrap().read_at.is_none());

        let theirs = ReadReceipt {
            message_id: "m1".into(),
            user_id: "u2".into(),
            read_at: at(3),
        };
        assert_eq!(cache.apply_read_receipt(&theirs), ReadOutcome::Stamped);
        assert_eq!(cache.message(&"m1".into()).unwrap().read_at, Some(at(3)));
        assert_eq!(cache.is_stale(&ConversationQuery::default()), Some(true));

        let later = ReadReceipt {
            read_at: at(9),
            ..theirs
        };
        assert_eq!(cache.apply_read_receipt(&later), ReadOutcome::AlreadyRead);
        assert_eq!(cache.message(&"m1".into()).unwrap().read_at, Some(at(3)));
    }

    #[test]
    fn test_read_receipt_for_unknown_message_is_dropped() {
        let mut cache = QueryCache::default();
        let receipt = ReadReceipt {
            message_id: "ghost".into(),
            user_id: "u2".into(),
            read_at: at(1),
        };
        assert_eq!(cache.apply_read_receipt(&receipt), ReadOutcome::UnknownMessage);
    }

    #[test]
    fn test_read_stamp_survives_refetch() {
        let mut cache = QueryCache::default();
        cache.apply_new_message(message("m1", "c1", "me", 1));
        cache.apply_read_receipt(&ReadReceipt {
            message_id: "m1".into(),
            user_id: "u2".into(),
            read_at: at(4),
        });

        cache.merge_fetched_messages(&"c1".into(), vec![message("m1", "c1", "me", 1)]);
        assert_eq!(cache.message(&"m1".into()).unwrap().read_at, Some(at(4)));
    }
}
