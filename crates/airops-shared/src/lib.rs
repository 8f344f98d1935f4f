//! # airops-shared
//!
//! Types shared by every airops crate: identifiers, the conversation and
//! message data model, the Socket.IO event contract spoken with the
//! messaging backend, and the error types that cross crate boundaries.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::{ConnectionError, EmitError, ProtocolError};
pub use models::*;
pub use protocol::{InboundEvent, OutboundEvent};
pub use types::{ConversationId, ConversationType, MessageId, MessageType, UserId};
