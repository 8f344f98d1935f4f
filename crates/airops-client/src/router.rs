//! Inbound event routing.
//!
//! A closed table: each [`InboundEvent`] variant goes to exactly one of the
//! cache, the presence tracker or the UI, unchanged. What the target
//! reports back is turned into [`SessionEvent`]s.

use std::time::Instant;

use tracing::{debug, info, warn};

use airops_cache::{AppendOutcome, ReactionOutcome, ReadOutcome};
use airops_net::Notification;
use airops_shared::protocol::{ReactionDelta, TypingUpdate};
use airops_shared::InboundEvent;

use crate::events::SessionEvent;
use crate::state::LiveState;

/// Apply one connection notification to the live state.
pub fn route_notification(
    state: &mut LiveState,
    notification: Notification,
    now: Instant,
) -> Vec<SessionEvent> {
    match notification {
        Notification::Event(wire) => match InboundEvent::decode_wire(&wire) {
            Ok(Some(event)) => route_event(state, event, now),
            Ok(None) => {
                debug!(event = %wire.name, "Ignoring unknown event");
                Vec::new()
            }
            Err(e) => {
                warn!(event = %wire.name, error = %e, "Dropping malformed event");
                Vec::new()
            }
        },
        Notification::Connected => vec![SessionEvent::Connected],
        Notification::Disconnected { reason } => {
            let mut events = vec![SessionEvent::Disconnected { reason }];
            if state.presence.clear() {
                events.push(SessionEvent::PresenceCleared);
            }
            events
        }
        Notification::ConnectError(err) => vec![SessionEvent::ConnectionError {
            reason: err.to_string(),
        }],
        Notification::Reconnecting { attempt, delay } => {
            vec![SessionEvent::reconnecting(attempt, delay)]
        }
    }
}

/// Apply one decoded server event to the live state.
pub fn route_event(state: &mut LiveState, event: InboundEvent, now: Instant) -> Vec<SessionEvent> {
    match event {
        InboundEvent::MessageNew(message) => {
            let conversation_id = message.conversation_id.clone();
            let message_id = message.id.clone();
            let outcome = state.cache.apply_new_message(message);
            match outcome.append {
                AppendOutcome::Appended { .. } => vec![
                    SessionEvent::MessageAppended {
                        conversation_id,
                        message_id,
                    },
                    SessionEvent::ConversationsChanged,
                ],
                AppendOutcome::Duplicate => Vec::new(),
            }
        }

        InboundEvent::MessageRead(receipt) => match state.cache.apply_read_receipt(&receipt) {
            ReadOutcome::Stamped => {
                let conversation_id = state
                    .cache
                    .message(&receipt.message_id)
                    .map(|m| m.conversation_id.clone());
                let mut events = Vec::with_capacity(2);
                if let Some(conversation_id) = conversation_id {
                    events.push(SessionEvent::ReadStamped {
                        conversation_id,
                        message_id: receipt.message_id,
                    });
                }
                events.push(SessionEvent::ConversationsChanged);
                events
            }
            ReadOutcome::AlreadyRead | ReadOutcome::OwnMessage | ReadOutcome::UnknownMessage => {
                Vec::new()
            }
        },

        InboundEvent::UserTyping(update) => route_typing(state, update, now),

        InboundEvent::UserOnline(update) => {
            if state.presence.user_online(&update.user_id) {
                vec![SessionEvent::PresenceChanged {
                    user_id: update.user_id,
                    online: true,
                }]
            } else {
                Vec::new()
            }
        }

        InboundEvent::UserOffline(update) => {
            if state.presence.user_offline(&update.user_id) {
                vec![SessionEvent::PresenceChanged {
                    user_id: update.user_id,
                    online: false,
                }]
            } else {
                Vec::new()
            }
        }

        InboundEvent::ReactionAdded(delta) => route_reaction(state, delta, true),
        InboundEvent::ReactionRemoved(delta) => route_reaction(state, delta, false),

        InboundEvent::EmergencyAlert(payload) => {
            info!("Emergency alert received");
            vec![SessionEvent::EmergencyAlert { payload }]
        }
    }
}

fn route_typing(state: &mut LiveState, update: TypingUpdate, now: Instant) -> Vec<SessionEvent> {
    let changed = if update.is_typing {
        state
            .presence
            .typing_started(&update.conversation_id, &update.user_id, now)
    } else {
        state
            .presence
            .typing_stopped(&update.conversation_id, &update.user_id)
    };
    if !changed {
        return Vec::new();
    }
    let users = state.presence.typing_users(&update.conversation_id);
    vec![SessionEvent::TypingChanged {
        conversation_id: update.conversation_id,
        users,
    }]
}

fn route_reaction(state: &mut LiveState, delta: ReactionDelta, added: bool) -> Vec<SessionEvent> {
    match state.cache.apply_reaction(&delta, added) {
        ReactionOutcome::Applied => vec![SessionEvent::ReactionChanged {
            message_id: delta.message_id,
        }],
        ReactionOutcome::NoChange | ReactionOutcome::UnknownMessage => Vec::new(),
    }
}

/// Drop typing flags that outlived the idle window.
pub fn sweep_typing(state: &mut LiveState, now: Instant) -> Vec<SessionEvent> {
    state
        .presence
        .expire(now)
        .into_iter()
        .map(|conversation_id| {
            let users = state.presence.typing_users(&conversation_id);
            SessionEvent::TypingChanged {
                conversation_id,
                users,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use airops_shared::protocol::WireEvent;
    use airops_shared::{ConnectionError, ConversationQuery, UserId};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn wire(name: &str, payload: Value) -> Notification {
        Notification::Event(WireEvent::new(name, payload))
    }

    fn message_payload(id: &str, conversation: &str, sender: &str) -> Value {
        json!({
            "id": id,
            "conversationId": conversation,
            "senderId": sender,
            "content": format!("body {id}"),
            "messageType": "text",
            "createdAt": "2026-03-01T08:30:00Z"
        })
    }

    fn conversation(id: &str, unread: u32) -> airops_shared::Conversation {
        serde_json::from_value(json!({
            "id": id,
            "type": "group",
            "name": "Ramp",
            "lastMessageAt": "2026-03-01T08:00:00Z",
            "memberCount": 3,
            "membership": { "role": "member", "unreadCount": unread, "isMuted": false }
        }))
        .unwrap()
    }

    #[test]
    fn test_new_message_appends_and_bumps_list() {
        let mut state = LiveState::default();
        state
            .cache
            .store_conversations(ConversationQuery::default(), vec![conversation("x", 2)]);
        let now = Instant::now();

        let events = route_notification(&mut state, wire("message:new", message_payload("m1", "x", "u2")), now);
        assert_eq!(
            events,
            vec![
                SessionEvent::MessageAppended {
                    conversation_id: "x".into(),
                    message_id: "m1".into(),
                },
                SessionEvent::ConversationsChanged,
            ]
        );

        let row = state.cache.conversation(&"x".into()).unwrap();
        assert_eq!(row.unread_count(), 2);
        assert_eq!(row.last_message_preview.as_deref(), Some("body m1"));
        assert_eq!(
            row.last_message_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap())
        );

        // Redelivery is silent.
        let events = route_notification(&mut state, wire("message:new", message_payload("m1", "x", "u2")), now);
        assert!(events.is_empty());
        assert_eq!(state.cache.messages(&"x".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_read_receipt_routes_to_cache() {
        let mut state = LiveState::default();
        let now = Instant::now();
        route_notification(&mut state, wire("message:new", message_payload("m1", "x", "me")), now);

        let events = route_notification(
            &mut state,
            wire(
                "message:read",
                json!({ "messageId": "m1", "userId": "u2", "readAt": "2026-03-01T08:31:00Z" }),
            ),
            now,
        );
        assert_eq!(events[0], SessionEvent::ReadStamped {
            conversation_id: "x".into(),
            message_id: "m1".into(),
        });
        assert!(state.cache.message(&"m1".into()).unwrap().read_at.is_some());

        let unknown = route_notification(
            &mut state,
            wire(
                "message:read",
                json!({ "messageId": "nope", "userId": "u2", "readAt": "2026-03-01T08:31:00Z" }),
            ),
            now,
        );
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_typing_is_scoped_to_its_conversation() {
        let mut state = LiveState::default();
        let now = Instant::now();

        let typing = |c: &str, u: &str, on: bool| {
            wire("user:typing", json!({ "conversationId": c, "userId": u, "isTyping": on }))
        };

        let events = route_notification(&mut state, typing("c1", "alice", true), now);
        assert_eq!(events, vec![SessionEvent::TypingChanged {
            conversation_id: "c1".into(),
            users: vec!["alice".into()],
        }]);

        // Stop without start: nothing changes anywhere.
        assert!(route_notification(&mut state, typing("c2", "alice", false), now).is_empty());
        assert_eq!(state.presence.typing_users(&"c1".into()), vec![UserId::new("alice")]);

        let events = route_notification(&mut state, typing("c1", "alice", false), now);
        assert_eq!(events, vec![SessionEvent::TypingChanged {
            conversation_id: "c1".into(),
            users: vec![],
        }]);
    }

    #[test]
    fn test_presence_is_independent_of_typing() {
        let mut state = LiveState::default();
        let now = Instant::now();
        route_notification(&mut state, wire("user:online", json!({ "userId": "alice" })), now);
        route_notification(
            &mut state,
            wire("user:typing", json!({ "conversationId": "c1", "userId": "alice", "isTyping": true })),
            now,
        );

        let events = route_notification(&mut state, wire("user:offline", json!({ "userId": "alice" })), now);
        assert_eq!(events, vec![SessionEvent::PresenceChanged {
            user_id: "alice".into(),
            online: false,
        }]);
        assert!(state.presence.is_typing(&"c1".into(), &"alice".into()));
    }

    #[test]
    fn test_disconnect_clears_presence_but_not_cache() {
        let mut state = LiveState::default();
        let now = Instant::now();
        route_notification(&mut state, wire("message:new", message_payload("m1", "x", "u2")), now);
        route_notification(&mut state, wire("user:online", json!({ "userId": "alice" })), now);

        let events = route_notification(
            &mut state,
            Notification::Disconnected {
                reason: "transport close".into(),
            },
            now,
        );
        assert_eq!(events, vec![
            SessionEvent::Disconnected {
                reason: "transport close".into()
            },
            SessionEvent::PresenceCleared,
        ]);
        assert!(!state.presence.is_online(&"alice".into()));
        assert_eq!(state.cache.messages(&"x".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_and_malformed_events_are_dropped() {
        let mut state = LiveState::default();
        let now = Instant::now();
        assert!(route_notification(&mut state, wire("flight:delayed", json!({ "id": 1 })), now).is_empty());
        assert!(route_notification(&mut state, wire("message:new", json!({ "id": 7 })), now).is_empty());
        assert!(state.cache.messages(&"x".into()).is_none());
    }

    #[test]
    fn test_connect_error_and_alert_are_surfaced() {
        let mut state = LiveState::default();
        let now = Instant::now();
        let events = route_notification(
            &mut state,
            Notification::ConnectError(ConnectionError::Rejected {
                reason: "jwt expired".into(),
            }),
            now,
        );
        assert!(matches!(&events[0], SessionEvent::ConnectionError { reason } if reason.contains("jwt expired")));

        let events = route_notification(&mut state, wire("emergency:alert", json!({ "level": "red" })), now);
        assert_eq!(events, vec![SessionEvent::EmergencyAlert {
            payload: json!({ "level": "red" })
        }]);
    }

    #[test]
    fn test_reactions_patch_cached_messages() {
        let mut state = LiveState::default();
        let now = Instant::now();
        route_notification(&mut state, wire("message:new", message_payload("m1", "x", "u2")), now);

        let reaction = json!({ "messageId": "m1", "userId": "u3", "emoji": "👍" });
        let events = route_notification(&mut state, wire("message:reaction:added", reaction.clone()), now);
        assert_eq!(events, vec![SessionEvent::ReactionChanged { message_id: "m1".into() }]);
        assert!(route_notification(&mut state, wire("message:reaction:added", reaction.clone()), now).is_empty());
        route_notification(&mut state, wire("message:reaction:removed", reaction), now);
        assert!(state.cache.message(&"m1".into()).unwrap().reactions.is_empty());
    }

    #[test]
    fn test_sweep_reports_expired_typing() {
        let mut state = LiveState::new(100, Some(Duration::from_secs(8)));
        let start = Instant::now();
        route_event(
            &mut state,
            InboundEvent::UserTyping(TypingUpdate {
                conversation_id: "c1".into(),
                user_id: "alice".into(),
                is_typing: true,
            }),
            start,
        );

        assert!(sweep_typing(&mut state, start + Duration::from_secs(1)).is_empty());
        assert_eq!(
            sweep_typing(&mut state, start + Duration::from_secs(9)),
            vec![SessionEvent::TypingChanged {
                conversation_id: "c1".into(),
                users: vec![],
            }]
        );
    }
}
