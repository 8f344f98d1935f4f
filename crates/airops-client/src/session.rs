//! The sync session: one per signed-in user.
//!
//! Owns the REST client, the socket connection and the live state, and runs
//! the loop that applies socket notifications to that state. Everything a
//! UI layer needs goes through here; nothing is global.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use airops_cache::{MergeOutcome, ReadAckOutcome};
use airops_net::{ConnectOutcome, ConnectionManager, ConnectionState, Connector, Notification, TokenSource};
use airops_shared::{
    Conversation, ConversationId, ConversationQuery, Message, MessageId, UserId, UserSummary,
};

use crate::api::{MessagingApi, NewGroup, NewMessage};
use crate::config::ClientConfig;
use crate::dispatcher;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::router::{route_notification, sweep_typing};
use crate::state::{lock, LiveState, SharedState};

/// How often expired typing flags are swept.
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

const EVENT_BUFFER: usize = 256;

struct EventLoop {
    stop: oneshot::Sender<()>,
    task: JoinHandle<mpsc::UnboundedReceiver<Notification>>,
}

pub struct SyncSession<A: MessagingApi> {
    api: A,
    connection: ConnectionManager,
    state: SharedState,
    events: broadcast::Sender<SessionEvent>,
    /// Parked here while the event loop is not running.
    notifications: Option<mpsc::UnboundedReceiver<Notification>>,
    event_loop: Option<EventLoop>,
    user_id: Option<UserId>,
    page_size: u32,
}

impl<A: MessagingApi> SyncSession<A> {
    pub fn new(
        config: &ClientConfig,
        api: A,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let (connection, notifications) =
            ConnectionManager::new(config.endpoint(), config.reconnect.clone(), connector, tokens);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            api,
            connection,
            state: Arc::new(std::sync::Mutex::new(LiveState::new(
                config.preview_chars,
                config.typing_expiry,
            ))),
            events,
            notifications: Some(notifications),
            event_loop: None,
            user_id: config.user_id.clone(),
            page_size: config.page_size,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start applying socket events and open the connection. Calling it
    /// again while running is a no-op. Must be called inside a tokio runtime.
    pub fn init(&mut self) -> ConnectOutcome {
        if self.event_loop.is_none() {
            match self.notifications.take() {
                Some(notifications) => {
                    let (stop, stop_rx) = oneshot::channel();
                    let task = tokio::spawn(run_event_loop(
                        self.state.clone(),
                        self.events.clone(),
                        notifications,
                        stop_rx,
                    ));
                    self.event_loop = Some(EventLoop { stop, task });
                    debug!("Session event loop started");
                }
                None => error!("Notification channel lost, live updates unavailable"),
            }
        }
        self.connection.connect()
    }

    /// Close the connection and stop the event loop. Cached data is kept so
    /// a later `init` resumes from it. Returns false if nothing was running.
    pub async fn teardown(&mut self) -> bool {
        let disconnected = self.connection.disconnect();

        let Some(event_loop) = self.event_loop.take() else {
            return disconnected;
        };
        // The loop drains what disconnect() queued before it honours the stop.
        let _ = event_loop.stop.send(());
        match event_loop.task.await {
            Ok(notifications) => self.notifications = Some(notifications),
            Err(e) => error!(error = %e, "Session event loop failed"),
        }
        info!("Session torn down");
        true
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Handle to the live state, for readers that outlive a borrow of the session.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Read the live state under its lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&LiveState) -> R) -> R {
        f(&lock(&self.state))
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Fetches
    // ------------------------------------------------------------------

    /// Fetch a conversation-list view and cache it, replacing any stale copy.
    /// Returns the view as cached, including live updates that landed
    /// while the request was in flight.
    pub async fn load_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>> {
        let fetch = lock(&self.state).cache.begin_list_fetch();
        let page = self.api.list_conversations(query).await?;
        let conversations = {
            let mut state = lock(&self.state);
            state.cache.complete_list_fetch(fetch, query, page.items);
            state
                .cache
                .conversations(&query)
                .map(<[Conversation]>::to_vec)
                .unwrap_or_default()
        };
        self.publish(SessionEvent::ConversationsChanged);
        Ok(conversations)
    }

    pub async fn load_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        let conversation = self.api.get_conversation(id).await?;
        lock(&self.state).cache.upsert_conversation(conversation.clone());
        self.publish(SessionEvent::ConversationsChanged);
        Ok(conversation)
    }

    /// Fetch the newest page of a conversation's messages and merge it with
    /// whatever events already delivered.
    pub async fn load_messages(&self, id: &ConversationId) -> Result<MergeOutcome> {
        let page = self.api.list_messages(id, 1, self.page_size).await?;
        let outcome = lock(&self.state)
            .cache
            .merge_fetched_messages(id, page.items);
        debug!(
            conversation = %id,
            fetched = outcome.fetched,
            history = outcome.history,
            retained = outcome.retained,
            "Messages loaded"
        );
        Ok(outcome)
    }

    /// Refetch every list view that live events marked stale. Returns how
    /// many views were refreshed.
    pub async fn refresh_stale(&self) -> Result<usize> {
        let stale = lock(&self.state).cache.stale_queries();
        for query in &stale {
            self.load_conversations(*query).await?;
        }
        Ok(stale.len())
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>> {
        Ok(self.api.search_users(query).await?)
    }

    pub async fn create_direct(&self, user: &UserId) -> Result<Conversation> {
        let conversation = self.api.create_direct(user).await?;
        self.adopt_created(&conversation);
        Ok(conversation)
    }

    pub async fn create_group(&self, draft: &NewGroup) -> Result<Conversation> {
        let conversation = self.api.create_group(draft).await?;
        self.adopt_created(&conversation);
        Ok(conversation)
    }

    fn adopt_created(&self, conversation: &Conversation) {
        lock(&self.state).cache.upsert_conversation(conversation.clone());
        self.publish(SessionEvent::ConversationsChanged);
        if let Err(e) = dispatcher::join_conversations(&self.connection, &[conversation.id.clone()]) {
            debug!(conversation = %conversation.id, error = %e, "Could not join new conversation room");
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub async fn send_message(&self, id: &ConversationId, draft: &NewMessage) -> Result<Message> {
        let (message, outcome) = dispatcher::send_message(&self.api, &self.state, id, draft).await?;
        if outcome != airops_cache::AppendOutcome::Duplicate {
            self.publish(SessionEvent::MessageAppended {
                conversation_id: id.clone(),
                message_id: message.id.clone(),
            });
            self.publish(SessionEvent::ConversationsChanged);
        }
        Ok(message)
    }

    /// Mark a whole conversation read: REST first, then the local unread
    /// reset, then a best-effort `message:read` for the newest message so
    /// the other participants see it.
    pub async fn mark_conversation_read(&self, id: &ConversationId) -> Result<ReadAckOutcome> {
        self.api.mark_as_read(id).await?;

        let (outcome, newest) = {
            let mut state = lock(&self.state);
            let outcome = state.cache.acknowledge_read(id);
            let newest = state
                .cache
                .latest_message(id)
                .filter(|m| Some(&m.sender_id) != self.user_id.as_ref())
                .map(|m| m.id.clone());
            (outcome, newest)
        };
        self.publish(SessionEvent::ConversationsChanged);

        if let Some(message_id) = newest {
            let sent = {
                let state = lock(&self.state);
                dispatcher::mark_read(&self.connection, &state, &message_id, id)
            };
            if let Err(e) = sent {
                debug!(conversation = %id, error = %e, "Read notice not sent");
            }
        }
        Ok(outcome)
    }

    /// Join the rooms of every conversation currently cached. Returns how
    /// many were requested.
    pub fn join_loaded(&self) -> Result<usize> {
        let ids = lock(&self.state).cache.known_conversation_ids();
        if ids.is_empty() {
            return Ok(0);
        }
        dispatcher::join_conversations(&self.connection, &ids)?;
        Ok(ids.len())
    }

    pub fn join_conversations(&self, ids: &[ConversationId]) -> Result<()> {
        Ok(dispatcher::join_conversations(&self.connection, ids)?)
    }

    pub fn start_typing(&self, id: &ConversationId) -> Result<()> {
        Ok(dispatcher::start_typing(&self.connection, &lock(&self.state), id)?)
    }

    pub fn stop_typing(&self, id: &ConversationId) -> Result<()> {
        Ok(dispatcher::stop_typing(&self.connection, &lock(&self.state), id)?)
    }

    pub fn mark_read(&self, message_id: &MessageId, conversation_id: &ConversationId) -> Result<()> {
        Ok(dispatcher::mark_read(
            &self.connection,
            &lock(&self.state),
            message_id,
            conversation_id,
        )?)
    }
}

async fn run_event_loop(
    state: SharedState,
    events: broadcast::Sender<SessionEvent>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    mut stop: oneshot::Receiver<()>,
) -> mpsc::UnboundedReceiver<Notification> {
    let mut sweep = tokio::time::interval(TYPING_SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let produced = tokio::select! {
            biased;
            received = notifications.recv() => match received {
                Some(notification) => route_notification(&mut lock(&state), notification, Instant::now()),
                None => {
                    warn!("Notification channel closed");
                    break;
                }
            },
            _ = &mut stop => break,
            _ = sweep.tick() => sweep_typing(&mut lock(&state), Instant::now()),
        };
        for event in produced {
            let _ = events.send(event);
        }
    }

    debug!("Session event loop stopped");
    notifications
}
