//! # airops-console
//!
//! Headless operator console: signs in with the configured token, loads the
//! conversation list, follows the live event stream and logs what happens.
//! Useful for checking a backend deployment without a browser.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use airops_client::{
    init_tracing, ClientConfig, HttpApi, SessionEvent, SessionTokenStore, SyncSession,
};
use airops_net::WsConnector;
use airops_shared::ConversationQuery;

/// How often list views made stale by live events are refetched.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting airops console v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(
        api = %config.api_url,
        socket = %config.socket_url,
        reconnect_attempts = config.reconnect.max_attempts,
        typing_expiry = ?config.typing_expiry,
        "Loaded configuration"
    );
    if config.access_token.is_none() {
        anyhow::bail!("AIROPS_ACCESS_TOKEN is not set");
    }

    // -----------------------------------------------------------------------
    // 2. Session
    // -----------------------------------------------------------------------
    let tokens = SessionTokenStore::new(config.access_token.clone());
    let api = HttpApi::new(config.api_url.clone(), tokens.clone())?;
    let mut session = SyncSession::new(&config, api, Arc::new(WsConnector), Arc::new(tokens));
    let mut events = session.subscribe_events();

    let conversations = session.load_conversations(ConversationQuery::default()).await?;
    info!(count = conversations.len(), "Conversations loaded");
    for conversation in &conversations {
        let name = match session.user_id() {
            Some(me) => conversation.display_name(me),
            None => conversation.name.clone().unwrap_or_else(|| conversation.id.to_string()),
        };
        info!(
            conversation = %conversation.id.short(),
            name = %name,
            unread = conversation.unread_count(),
            "Conversation"
        );
    }

    session.init();

    // -----------------------------------------------------------------------
    // 3. Follow the event stream until Ctrl+C
    // -----------------------------------------------------------------------
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => on_event(&session, event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Console fell behind the event stream"),
                Err(RecvError::Closed) => break,
            },
            _ = refresh.tick() => {
                if let Err(e) = session.refresh_stale().await {
                    warn!(error = %e, "Refreshing conversation lists failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    session.teardown().await;
    Ok(())
}

fn on_event(session: &SyncSession<HttpApi>, event: SessionEvent) {
    match event {
        SessionEvent::Connected => match session.join_loaded() {
            Ok(count) => info!(count, "Connected, joined conversation rooms"),
            Err(e) => warn!(error = %e, "Joining conversation rooms failed"),
        },
        SessionEvent::MessageAppended {
            conversation_id,
            message_id,
        } => {
            let preview = session.with_state(|state| {
                state
                    .cache
                    .message(&message_id)
                    .map(|m| m.content.clone())
                    .unwrap_or_default()
            });
            info!(conversation = %conversation_id.short(), message = %message_id.short(), %preview, "New message");
        }
        SessionEvent::EmergencyAlert { payload } => warn!(%payload, "EMERGENCY ALERT"),
        SessionEvent::ConversationsChanged => {}
        other => info!(kind = other.channel(), event = ?other, "Session event"),
    }
}
