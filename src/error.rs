use thiserror::Error;

use crate::relay::ConnectionId;

/// Error types for the signaling relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Handshake errors
    #[error("Missing required join parameter: {0}")]
    MissingJoinParameter(&'static str),

    /// Delivery errors
    #[error("Send failed: connection {0} is closed")]
    SendFailed(ConnectionId),

    /// Signaling errors
    #[error("Invalid signaling message: {0}")]
    InvalidSignalingMessage(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigurationParseFailed(String),

    /// Network errors
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Convenience type alias for Results using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Helper to create network errors
    pub fn network(msg: impl Into<String>) -> Self {
        RelayError::NetworkError(msg.into())
    }

    /// Helper to create signaling message errors
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        RelayError::InvalidSignalingMessage(msg.into())
    }
}

impl From<warp::Error> for RelayError {
    fn from(err: warp::Error) -> Self {
        RelayError::network(err.to_string())
    }
}
