//! Transport seam and the WebSocket implementation used in production.
//!
//! A [`Connector`] turns an endpoint plus a bearer token into a [`Link`]: a
//! pair of channels carrying already-decoded events. Everything below the
//! link (Engine.IO handshake, heartbeats, packet framing) stays inside the
//! connector's own task.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use airops_shared::constants::{DEFAULT_SOCKET_PATH, ENGINE_IO_VERSION};
use airops_shared::protocol::WireEvent;
use airops_shared::ConnectionError;

use crate::codec::{connect_error_reason, EnginePacket, OpenHandshake, SocketPacket, ROOT_NAMESPACE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where the messaging backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL, `http(s)://` or `ws(s)://`.
    pub url: String,
    /// Socket.IO mount path.
    pub path: String,
    /// Budget for the whole handshake, TCP connect included.
    pub connect_timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Engine.IO WebSocket URL, e.g. `wss://ops.example/socket.io/?EIO=4&transport=websocket`.
    pub fn websocket_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let path = if path.ends_with('/') {
            path
        } else {
            format!("{path}/")
        };

        format!("{base}{path}?EIO={ENGINE_IO_VERSION}&transport=websocket")
    }
}

/// What a live link delivers to the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Event(WireEvent),
    Closed { reason: String },
}

/// An established, authenticated connection.
///
/// Dropping `outbound` asks the transport to close.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<WireEvent>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Factory for links. One call per connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        endpoint: &Endpoint,
        token: String,
    ) -> BoxFuture<'static, Result<Link, ConnectionError>>;
}

// ---------------------------------------------------------------------------
// WebSocket connector
// ---------------------------------------------------------------------------

/// Socket.IO over a plain WebSocket (no long-polling fallback).
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &self,
        endpoint: &Endpoint,
        token: String,
    ) -> BoxFuture<'static, Result<Link, ConnectionError>> {
        let url = endpoint.websocket_url();
        let budget = endpoint.connect_timeout;
        Box::pin(async move {
            match tokio::time::timeout(budget, handshake(url, token)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout),
            }
        })
    }
}

async fn handshake(url: String, token: String) -> Result<Link, ConnectionError> {
    debug!(url = %url, "Opening websocket");
    let (mut ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ConnectionError::Transport {
            reason: e.to_string(),
        })?;

    let open = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(open) => break open,
            EnginePacket::Noop => continue,
            other => {
                return Err(ConnectionError::Handshake {
                    reason: format!("expected open packet, got {other:?}"),
                })
            }
        }
    };
    debug!(sid = %open.sid, ping_interval = open.ping_interval, "Engine.IO session opened");

    let connect = EnginePacket::Message(SocketPacket::Connect(Some(json!({ "token": token }))));
    send_packet(&mut ws, &connect).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Message(SocketPacket::Connect(_)) => break,
            EnginePacket::Message(SocketPacket::ConnectError(body)) => {
                return Err(ConnectionError::Rejected {
                    reason: connect_error_reason(&body),
                })
            }
            EnginePacket::Ping(data) => send_packet(&mut ws, &EnginePacket::Pong(data)).await?,
            EnginePacket::Noop => {}
            other => {
                return Err(ConnectionError::Handshake {
                    reason: format!("expected connect ack, got {other:?}"),
                })
            }
        }
    }

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(ws, open, outbound_rx, inbound_tx));

    Ok(Link {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, ConnectionError> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return EnginePacket::decode(&text).map_err(|e| ConnectionError::Handshake {
                    reason: e.to_string(),
                })
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(ConnectionError::Transport {
                    reason: "closed during handshake".to_string(),
                })
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ConnectionError::Transport {
                    reason: e.to_string(),
                })
            }
        }
    }
}

async fn send_packet(ws: &mut WsStream, packet: &EnginePacket) -> Result<(), ConnectionError> {
    ws.send(WsMessage::Text(packet.encode()))
        .await
        .map_err(|e| ConnectionError::Transport {
            reason: e.to_string(),
        })
}

/// Moves frames between the websocket and the link channels until either
/// side goes away, then reports why.
async fn pump(
    mut ws: WsStream,
    open: OpenHandshake,
    mut outbound: mpsc::UnboundedReceiver<WireEvent>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
) {
    // The server pings every `ping_interval`; silence beyond interval + timeout means a dead link.
    let liveness = Duration::from_millis(open.ping_interval + open.ping_timeout);
    let mut deadline = Instant::now() + liveness;

    let reason = loop {
        tokio::select! {
            frame = ws.next() => {
                deadline = Instant::now() + liveness;
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break "transport close".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break format!("transport error: {e}"),
                };

                match EnginePacket::decode(&text) {
                    Ok(EnginePacket::Ping(data)) => {
                        if let Err(e) = send_packet(&mut ws, &EnginePacket::Pong(data)).await {
                            break e.reason();
                        }
                    }
                    Ok(EnginePacket::Message(SocketPacket::Event { namespace, event, .. })) => {
                        if namespace != ROOT_NAMESPACE {
                            trace!(namespace = %namespace, event = %event.name, "Ignoring event on foreign namespace");
                            continue;
                        }
                        if inbound.send(LinkEvent::Event(event)).is_err() {
                            break "link dropped".to_string();
                        }
                    }
                    Ok(EnginePacket::Message(SocketPacket::Disconnect)) => {
                        break "io server disconnect".to_string();
                    }
                    Ok(EnginePacket::Close) => break "transport close".to_string(),
                    Ok(other) => trace!(packet = ?other, "Ignoring packet"),
                    Err(e) => warn!(error = %e, "Undecodable packet from server"),
                }
            }

            _ = tokio::time::sleep_until(deadline) => {
                break "ping timeout".to_string();
            }

            out = outbound.recv() => {
                match out {
                    Some(event) => {
                        let packet = EnginePacket::Message(SocketPacket::event(event));
                        if let Err(e) = send_packet(&mut ws, &packet).await {
                            break e.reason();
                        }
                    }
                    None => {
                        let _ = send_packet(&mut ws, &EnginePacket::Message(SocketPacket::Disconnect)).await;
                        let _ = ws.close(None).await;
                        break "io client disconnect".to_string();
                    }
                }
            }
        }
    };

    debug!(reason = %reason, "Websocket pump stopped");
    let _ = inbound.send(LinkEvent::Closed { reason });
}
