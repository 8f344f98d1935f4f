//! Local user actions.
//!
//! Notifications (join, typing, read) go out on the socket. Sending a
//! message is a REST write whose response is merged into the cache; the
//! backend's `message:new` broadcast of the same message is absorbed by
//! the append rule whichever arrives first.

use tracing::{debug, info};

use airops_cache::AppendOutcome;
use airops_net::ConnectionManager;
use airops_shared::protocol::ReadNotice;
use airops_shared::{ConversationId, Message, MessageId, OutboundEvent};

use crate::api::{MessagingApi, NewMessage};
use crate::error::DispatchError;
use crate::state::{lock, LiveState, SharedState};

/// Ask the backend to put this socket in the rooms of `ids`.
pub fn join_conversations(
    connection: &ConnectionManager,
    ids: &[ConversationId],
) -> Result<(), DispatchError> {
    let mut unique: Vec<ConversationId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    if unique.is_empty() {
        return Err(DispatchError::EmptySelection);
    }
    debug!(count = unique.len(), "Joining conversations");
    connection.emit(&OutboundEvent::JoinConversations(unique))?;
    Ok(())
}

pub fn start_typing(
    connection: &ConnectionManager,
    state: &LiveState,
    conversation_id: &ConversationId,
) -> Result<(), DispatchError> {
    ensure_known(state, conversation_id)?;
    connection.emit(&OutboundEvent::TypingStart(conversation_id.clone()))?;
    Ok(())
}

pub fn stop_typing(
    connection: &ConnectionManager,
    state: &LiveState,
    conversation_id: &ConversationId,
) -> Result<(), DispatchError> {
    ensure_known(state, conversation_id)?;
    connection.emit(&OutboundEvent::TypingStop(conversation_id.clone()))?;
    Ok(())
}

/// Tell the other participants the local user has read `message_id`.
pub fn mark_read(
    connection: &ConnectionManager,
    state: &LiveState,
    message_id: &MessageId,
    conversation_id: &ConversationId,
) -> Result<(), DispatchError> {
    ensure_known(state, conversation_id)?;
    connection.emit(&OutboundEvent::MessageRead(ReadNotice {
        message_id: message_id.clone(),
        conversation_id: conversation_id.clone(),
    }))?;
    Ok(())
}

/// Create a message through the REST API and merge the created message
/// into the cache. Never touches the socket.
pub async fn send_message<A: MessagingApi>(
    api: &A,
    state: &SharedState,
    conversation_id: &ConversationId,
    draft: &NewMessage,
) -> Result<(Message, AppendOutcome), DispatchError> {
    if draft.is_empty() {
        return Err(DispatchError::EmptyMessage);
    }
    ensure_known(&lock(state), conversation_id)?;

    let created = api.send_message(conversation_id, draft).await?;

    let outcome = lock(state).cache.apply_new_message(created.clone());
    info!(
        conversation = %conversation_id,
        message = %created.id,
        duplicate = outcome.append == AppendOutcome::Duplicate,
        "Message sent"
    );
    Ok((created, outcome.append))
}

fn ensure_known(state: &LiveState, conversation_id: &ConversationId) -> Result<(), DispatchError> {
    if state.cache.is_known_conversation(conversation_id) {
        Ok(())
    } else {
        Err(DispatchError::UnknownConversation(conversation_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use airops_net::{ConnectionState, Endpoint, MemoryConnector, ReconnectPolicy, StaticToken};
    use airops_shared::{ConversationQuery, EmitError};
    use serde_json::json;

    fn known_state() -> LiveState {
        let mut state = LiveState::default();
        let conversation = serde_json::from_value(json!({ "id": "c1", "type": "direct" })).unwrap();
        state
            .cache
            .store_conversations(ConversationQuery::default(), vec![conversation]);
        state
    }

    async fn connected(connector: &MemoryConnector) -> ConnectionManager {
        let (mut manager, _rx) = ConnectionManager::new(
            Endpoint::new("http://localhost:5000"),
            ReconnectPolicy::disabled(),
            Arc::new(connector.clone()),
            Arc::new(StaticToken("t".into())),
        );
        let mut state = manager.watch_state();
        manager.connect();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .expect("connected in time")
        .expect("state channel open");
        manager
    }

    #[tokio::test]
    async fn test_notifications_are_emitted() {
        let connector = MemoryConnector::new();
        let manager = connected(&connector).await;
        let state = known_state();

        join_conversations(&manager, &["c1".into(), "c1".into(), "c2".into()]).unwrap();
        start_typing(&manager, &state, &"c1".into()).unwrap();
        stop_typing(&manager, &state, &"c1".into()).unwrap();
        mark_read(&manager, &state, &"m9".into(), &"c1".into()).unwrap();

        let emitted = connector.emitted();
        let names: Vec<&str> = emitted.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["conversations:join", "typing:start", "typing:stop", "message:read"]
        );
        assert_eq!(emitted[0].payload, json!(["c1", "c2"]));
        assert_eq!(emitted[1].payload, json!("c1"));
        assert_eq!(
            emitted[3].payload,
            json!({ "messageId": "m9", "conversationId": "c1" })
        );
    }

    #[tokio::test]
    async fn test_validation_happens_before_emitting() {
        let connector = MemoryConnector::new();
        let manager = connected(&connector).await;
        let state = known_state();

        assert!(matches!(
            join_conversations(&manager, &[]),
            Err(DispatchError::EmptySelection)
        ));
        assert!(matches!(
            start_typing(&manager, &state, &"ghost".into()),
            Err(DispatchError::UnknownConversation(id)) if id.as_str() == "ghost"
        ));
        assert!(connector.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_emit_without_connection_is_reported() {
        let connector = MemoryConnector::new();
        let (manager, _rx) = ConnectionManager::new(
            Endpoint::new("http://localhost:5000"),
            ReconnectPolicy::disabled(),
            Arc::new(connector),
            Arc::new(StaticToken("t".into())),
        );
        let state = known_state();
        assert!(matches!(
            start_typing(&manager, &state, &"c1".into()),
            Err(DispatchError::Emit(EmitError::NotConnected))
        ));
    }
}
