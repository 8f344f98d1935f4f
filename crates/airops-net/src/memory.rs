//! In-process connector.
//!
//! Plays the server side of a link without any network: queued outcomes
//! decide whether each connection attempt succeeds, and the handle can push
//! events to the client or read back what it emitted. Used by the session
//! tests and by embedders that bridge the sync core onto another transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use airops_shared::protocol::WireEvent;
use airops_shared::ConnectionError;

use crate::transport::{Connector, Endpoint, Link, LinkEvent};

#[derive(Default)]
struct MemoryState {
    scripted_failures: VecDeque<ConnectionError>,
    tokens: Vec<String>,
    to_client: Option<mpsc::UnboundedSender<LinkEvent>>,
    from_client: Option<mpsc::UnboundedReceiver<WireEvent>>,
    emitted: Vec<WireEvent>,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next connection attempt fail with `error`.
    pub fn fail_next(&self, error: ConnectionError) {
        self.state().scripted_failures.push_back(error);
    }

    /// Number of connection attempts seen so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state().tokens.len()
    }

    /// Bearer tokens presented by each attempt, oldest first.
    pub fn tokens(&self) -> Vec<String> {
        self.state().tokens.clone()
    }

    /// Whether a link is up and the client still holds its end.
    pub fn is_open(&self) -> bool {
        self.state()
            .to_client
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Deliver a server event to the connected client. Returns false when
    /// nobody is connected.
    pub fn push(&self, name: &str, payload: Value) -> bool {
        let state = self.state();
        match state.to_client.as_ref() {
            Some(tx) => tx.send(LinkEvent::Event(WireEvent::new(name, payload))).is_ok(),
            None => false,
        }
    }

    /// Simulate the server or network dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state();
        if let Some(tx) = state.to_client.take() {
            let _ = tx.send(LinkEvent::Closed {
                reason: reason.to_string(),
            });
        }
        state.from_client = None;
    }

    /// Everything the client has emitted so far, oldest first.
    pub fn emitted(&self) -> Vec<WireEvent> {
        let mut state = self.state();
        let mut drained = Vec::new();
        if let Some(rx) = state.from_client.as_mut() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        state.emitted.extend(drained);
        state.emitted.clone()
    }
}

impl Connector for MemoryConnector {
    fn open(
        &self,
        _endpoint: &Endpoint,
        token: String,
    ) -> BoxFuture<'static, Result<Link, ConnectionError>> {
        let result = {
            let mut state = self.state();
            state.tokens.push(token);
            match state.scripted_failures.pop_front() {
                Some(error) => Err(error),
                None => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

                    // Keep anything the previous link emitted before swapping it out.
                    if let Some(mut previous) = state.from_client.take() {
                        while let Ok(event) = previous.try_recv() {
                            state.emitted.push(event);
                        }
                    }
                    state.to_client = Some(inbound_tx);
                    state.from_client = Some(outbound_rx);

                    Ok(Link {
                        outbound: outbound_tx,
                        inbound: inbound_rx,
                    })
                }
            }
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let connector = MemoryConnector::new();
        connector.fail_next(ConnectionError::Timeout);
        let endpoint = Endpoint::new("http://localhost");

        let first = connector.open(&endpoint, "a".into()).await;
        assert!(matches!(first, Err(ConnectionError::Timeout)));

        let mut link = connector.open(&endpoint, "b".into()).await.unwrap();
        assert_eq!(connector.tokens(), vec!["a".to_string(), "b".to_string()]);
        assert!(connector.is_open());

        assert!(connector.push("user:online", json!({"userId": "u1"})));
        match link.inbound.recv().await {
            Some(LinkEvent::Event(event)) => assert_eq!(event.name, "user:online"),
            other => panic!("unexpected {other:?}"),
        }

        link.outbound
            .send(WireEvent::new("typing:start", json!("c1")))
            .unwrap();
        assert_eq!(connector.emitted().len(), 1);

        drop(link);
        assert!(!connector.is_open());
    }
}
