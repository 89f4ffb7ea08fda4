//! Error types for eventwire.

use thiserror::Error;

/// Main error type for all eventwire operations.
#[derive(Debug, Error)]
pub enum EventwireError {
    /// Event or operation name contains the `$` sentinel.
    #[error("invalid name {0:?}: event name cannot contain '$'")]
    InvalidName(String),

    /// Operation config that cannot be placed on the head line.
    #[error("invalid operation config {0:?}: must be single-line UTF-8")]
    InvalidConfig(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while building a payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed before the operation could complete.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound handshake did not finish within the configured timeout.
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

/// Result type alias using EventwireError.
pub type Result<T> = std::result::Result<T, EventwireError>;

/// Fail fast when a name would produce an ambiguous frame.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.contains('$') {
        return Err(EventwireError::InvalidName(name.to_string()));
    }
    Ok(())
}
