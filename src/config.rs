//! Endpoint configuration.

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Default timeout for the outbound WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum size of one inbound message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Default maximum size of one inbound frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;

/// Settings shared by every connection an endpoint creates or accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Largest inbound message accepted; `None` disables the limit.
    pub max_message_size: Option<usize>,
    /// Largest inbound frame accepted; `None` disables the limit.
    pub max_frame_size: Option<usize>,
    /// How long `connect` waits for the handshake.
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on outbound TCP connections.
    pub nodelay: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            max_frame_size: Some(DEFAULT_MAX_FRAME_SIZE),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

impl EndpointConfig {
    /// Map onto tungstenite's socket settings.
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_frame_size;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::default();
        assert_eq!(config.max_message_size, Some(DEFAULT_MAX_MESSAGE_SIZE));
        assert_eq!(config.max_frame_size, Some(DEFAULT_MAX_FRAME_SIZE));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(config.nodelay);
    }

    #[test]
    fn test_websocket_config_carries_limits() {
        let config = EndpointConfig {
            max_message_size: Some(1024),
            max_frame_size: None,
            ..Default::default()
        };
        let ws = config.websocket_config();
        assert_eq!(ws.max_message_size, Some(1024));
        assert_eq!(ws.max_frame_size, None);
    }
}
