// Socket.IO connection layer for the messaging backend.

pub mod backoff;
pub mod codec;
pub mod connection;
pub mod memory;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use connection::{
    ConnectOutcome, ConnectionManager, ConnectionState, HandlerId, Notification, StaticToken,
    TokenSource,
};
pub use memory::MemoryConnector;
pub use transport::{Connector, Endpoint, Link, LinkEvent, WsConnector};
