use thiserror::Error;

use airops_shared::{ConversationId, EmitError};

/// A call to the messaging REST backend failed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("No access token available")]
    MissingToken,
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. } | Self::MissingToken)
    }
}

/// A local action was refused before anything left the client, or could
/// not be delivered.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No conversations to join")]
    EmptySelection,

    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    #[error("Message has no content")]
    EmptyMessage,

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
