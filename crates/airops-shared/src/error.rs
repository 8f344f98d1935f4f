use thiserror::Error;

/// A payload on a known event name did not match its contract.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid payload for event '{event}': {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a connection attempt failed or a live connection dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The backend refused the handshake (bad or expired token, usually).
    #[error("Connection rejected: {reason}")]
    Rejected { reason: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("No access token available")]
    MissingToken,
}

impl ConnectionError {
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { reason } | Self::Transport { reason } | Self::Handshake { reason } => {
                reason.clone()
            }
            Self::Timeout => "timeout".to_string(),
            Self::MissingToken => "missing token".to_string(),
        }
    }

    /// Rejections and missing credentials will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Handshake { .. } | Self::Timeout
        )
    }
}

/// An outbound emission was not handed to a live connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed while sending")]
    Closed,

    #[error("Could not encode payload: {0}")]
    Encode(String),
}
