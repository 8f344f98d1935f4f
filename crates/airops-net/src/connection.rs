//! Connection manager with a command/notification split.
//!
//! The connection itself is driven by a background tokio task. The manager
//! keeps only the handle to that task plus the sender half of the live
//! link; everything the task observes is reported through an unbounded
//! notification channel and through the per-event handler registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use airops_shared::constants::{EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT};
use airops_shared::protocol::{OutboundEvent, WireEvent};
use airops_shared::{ConnectionError, EmitError};

use crate::backoff::ReconnectPolicy;
use crate::transport::{Connector, Endpoint, Link, LinkEvent};

/// Reason reported when the local side closes the connection.
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// Everything the connection task reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connected,
    Disconnected { reason: String },
    ConnectError(ConnectionError),
    Reconnecting { attempt: u32, delay: Duration },
    Event(WireEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A connection task was started.
    Started,
    /// A connection task was already running; nothing changed.
    AlreadyActive,
}

/// Supplies the bearer token at the moment a connection is attempted.
pub trait TokenSource: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

/// A token fixed at construction time.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub type HandlerId = u64;

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    next_id: HandlerId,
    handlers: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    fn add(&mut self, event: &str, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = self.next_id;
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&mut self, event: &str, id: Option<HandlerId>) -> usize {
        let Some(list) = self.handlers.get_mut(event) else {
            return 0;
        };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(existing, _)| *existing != id),
            None => list.clear(),
        }
        let removed = before - list.len();
        if list.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    fn snapshot(&self, event: &str) -> Vec<Handler> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<WireEvent>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LiveConnection {
    outbound: OutboundSlot,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns at most one connection to the messaging backend.
///
/// `connect` and `disconnect` must be called from within a tokio runtime.
pub struct ConnectionManager {
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    notif_tx: mpsc::UnboundedSender<Notification>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    live: Option<LiveConnection>,
}

impl ConnectionManager {
    /// Build a manager and the receiver for its notifications.
    pub fn new(
        endpoint: Endpoint,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenSource>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            endpoint,
            policy,
            connector,
            tokens,
            handlers: Arc::new(Mutex::new(HandlerRegistry::default())),
            notif_tx,
            state_tx: Arc::new(state_tx),
            live: None,
        };
        (manager, notif_rx)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start connecting in the background. A no-op while a connection task
    /// is alive (connecting, connected or waiting to reconnect).
    pub fn connect(&mut self) -> ConnectOutcome {
        if let Some(live) = &self.live {
            if !live.task.is_finished() {
                debug!("connect() ignored, connection already active");
                return ConnectOutcome::AlreadyActive;
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));
        let driver = Driver {
            endpoint: self.endpoint.clone(),
            policy: self.policy.clone(),
            connector: self.connector.clone(),
            tokens: self.tokens.clone(),
            handlers: self.handlers.clone(),
            notif_tx: self.notif_tx.clone(),
            state_tx: self.state_tx.clone(),
            outbound: outbound.clone(),
        };

        info!(url = %self.endpoint.url, "Connecting to messaging backend");
        self.state_tx.send_replace(ConnectionState::Connecting);
        let task = tokio::spawn(driver.run(shutdown_rx));

        self.live = Some(LiveConnection {
            outbound,
            shutdown: Some(shutdown_tx),
            task,
        });
        ConnectOutcome::Started
    }

    /// Tear the connection down. Returns false when there was nothing to
    /// tear down. Never touches anything but the connection.
    pub fn disconnect(&mut self) -> bool {
        let Some(mut live) = self.live.take() else {
            return false;
        };

        // Signal first so the driver does not mistake the close for a drop.
        if let Some(tx) = live.shutdown.take() {
            let _ = tx.send(());
        }
        let was_connected = lock(&live.outbound).take().is_some();
        let previous = self.state_tx.send_replace(ConnectionState::Disconnected);

        info!(previous = ?previous, "Disconnected from messaging backend");
        if was_connected {
            let _ = self.notif_tx.send(Notification::Disconnected {
                reason: CLIENT_DISCONNECT_REASON.to_string(),
            });
            dispatch(
                &self.handlers,
                EVENT_DISCONNECT,
                &Value::String(CLIENT_DISCONNECT_REASON.to_string()),
            );
        }
        true
    }

    /// Emit a typed outbound event on the live connection.
    pub fn emit(&self, event: &OutboundEvent) -> Result<(), EmitError> {
        let wire = event
            .to_wire()
            .map_err(|e| EmitError::Encode(e.to_string()))?;
        self.emit_raw(wire)
    }

    /// Emit an arbitrary named event. Nothing is queued: without a live
    /// connection the event is dropped and `NotConnected` returned.
    pub fn emit_raw(&self, event: WireEvent) -> Result<(), EmitError> {
        let Some(live) = &self.live else {
            debug!(event = %event.name, "Dropping emit, not connected");
            return Err(EmitError::NotConnected);
        };
        let slot = lock(&live.outbound);
        match slot.as_ref() {
            Some(tx) => {
                debug!(event = %event.name, "Emitting");
                tx.send(event).map_err(|_| EmitError::Closed)
            }
            None => {
                debug!(event = %event.name, "Dropping emit, not connected");
                Err(EmitError::NotConnected)
            }
        }
    }

    /// Register a handler for a named inbound event (or one of the reserved
    /// `connect` / `disconnect` / `connect_error` names). Handlers run on
    /// the connection task, in registration order.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        lock(&self.handlers).add(event, Arc::new(handler))
    }

    /// Remove one handler, or every handler for `event` when `id` is `None`.
    /// Returns how many were removed.
    pub fn unsubscribe(&self, event: &str, id: Option<HandlerId>) -> usize {
        lock(&self.handlers).remove(event, id)
    }
}

fn dispatch(handlers: &Mutex<HandlerRegistry>, event: &str, payload: &Value) {
    // Snapshot so handlers may (un)subscribe without deadlocking.
    let snapshot = lock(handlers).snapshot(event);
    for handler in snapshot {
        handler(payload);
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

enum Served {
    Shutdown,
    Dropped(String),
}

struct Driver {
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    notif_tx: mpsc::UnboundedSender<Notification>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    outbound: OutboundSlot,
}

impl Driver {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut attempt: u32 = 0;

        loop {
            let Some(token) = self.tokens.access_token() else {
                warn!("No access token, not connecting");
                self.connect_failed(&ConnectionError::MissingToken);
                break;
            };

            let opened = tokio::select! {
                biased;
                _ = &mut shutdown => return,
                result = self.connector.open(&self.endpoint, token) => result,
            };

            match opened {
                Ok(link) => {
                    attempt = 0;
                    match self.serve(link, &mut shutdown).await {
                        Served::Shutdown => return,
                        Served::Dropped(reason) => {
                            warn!(reason = %reason, "Connection lost");
                            let _ = self.notif_tx.send(Notification::Disconnected {
                                reason: reason.clone(),
                            });
                            dispatch(&self.handlers, EVENT_DISCONNECT, &Value::String(reason));
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, attempt, "Connection attempt failed");
                    self.connect_failed(&err);
                    if !err.is_retryable() {
                        break;
                    }
                }
            }

            attempt += 1;
            let Some(delay) = self.next_delay(attempt) else {
                warn!(attempt, "Giving up on reconnecting");
                break;
            };
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.state_tx
                .send_replace(ConnectionState::Reconnecting { attempt });
            let _ = self
                .notif_tx
                .send(Notification::Reconnecting { attempt, delay });

            tokio::select! {
                biased;
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let mut rng = rand::thread_rng();
        self.policy.delay_for(attempt, &mut rng)
    }

    fn connect_failed(&self, err: &ConnectionError) {
        let _ = self.notif_tx.send(Notification::ConnectError(err.clone()));
        dispatch(
            &self.handlers,
            EVENT_CONNECT_ERROR,
            &json!({ "message": err.reason() }),
        );
    }

    async fn serve(&self, link: Link, shutdown: &mut oneshot::Receiver<()>) -> Served {
        let Link {
            outbound,
            mut inbound,
        } = link;

        {
            // disconnect() signals before it clears the slot, so checking
            // under the slot lock leaves no window for a late Connected.
            let mut slot = lock(&self.outbound);
            if shutdown_requested(shutdown) {
                debug!("Shutdown requested while opening, dropping the new link");
                return Served::Shutdown;
            }
            *slot = Some(outbound);
            self.state_tx.send_replace(ConnectionState::Connected);
            let _ = self.notif_tx.send(Notification::Connected);
        }
        info!(url = %self.endpoint.url, "Connected to messaging backend");
        dispatch(&self.handlers, EVENT_CONNECT, &Value::Null);

        let served = loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => break Served::Shutdown,
                received = inbound.recv() => match received {
                    Some(LinkEvent::Event(event)) => {
                        dispatch(&self.handlers, &event.name, &event.payload);
                        let _ = self.notif_tx.send(Notification::Event(event));
                    }
                    Some(LinkEvent::Closed { reason }) => break Served::Dropped(reason),
                    None => break Served::Dropped("transport close".to_string()),
                },
            }
        };

        lock(&self.outbound).take();
        served
    }
}

/// A closed channel counts too: the manager is gone.
fn shutdown_requested(shutdown: &mut oneshot::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}
