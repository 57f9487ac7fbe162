//! Error types for streamwire.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for all streaming operations.
#[derive(Debug, Error)]
pub enum StreamingError {
    /// I/O error during pipe/socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (request/response envelopes).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A 48-byte header failed validation.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Protocol error (unexpected frame, bad envelope, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation attempted on a transport that is not connected.
    #[error("Transport is not connected")]
    NotConnected,

    /// The connection was torn down; carries the disconnect reason.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// A response is already pending for this request ID.
    #[error("A response is already pending for request {0}")]
    DuplicateRequestId(Uuid),

    /// WebSocket binding error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A required constructor argument was missing or empty.
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamingError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamingError::WebSocket(err.to_string())
    }
}

/// Result type alias using StreamingError.
pub type Result<T> = std::result::Result<T, StreamingError>;
