use tracing::debug;

use airops_shared::protocol::ReactionDelta;
use airops_shared::Reaction;

use crate::cache::QueryCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Applied,
    /// Adding a reaction already present, or removing one that is absent.
    NoChange,
    UnknownMessage,
}

impl QueryCache {
    /// Apply a reaction added/removed event to the cached message. A user
    /// holds at most one reaction per emoji on a message.
    pub fn apply_reaction(&mut self, delta: &ReactionDelta, added: bool) -> ReactionOutcome {
        let Some(conversation_id) = self.message_index.get(&delta.message_id).cloned() else {
            debug!(message = %delta.message_id, "Reaction for unknown message dropped");
            return ReactionOutcome::UnknownMessage;
        };
        let Some(message) = self
            .sequences
            .get_mut(&conversation_id)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == delta.message_id))
        else {
            return ReactionOutcome::UnknownMessage;
        };

        let position = message
            .reactions
            .iter()
            .position(|r| r.user_id == delta.user_id && r.emoji == delta.emoji);

        match (added, position) {
            (true, None) => {
                message.reactions.push(Reaction {
                    user_id: delta.user_id.clone(),
                    emoji: delta.emoji.clone(),
                });
                ReactionOutcome::Applied
            }
            (false, Some(pos)) => {
                message.reactions.remove(pos);
                ReactionOutcome::Applied
            }
            _ => ReactionOutcome::NoChange,
        }
    }
}
