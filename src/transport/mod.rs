//! Transport module - the seam between connections and the socket.
//!
//! A [`Connection`](crate::Connection) only needs two things from a transport:
//! - a [`TransportSink`] to push outbound messages into
//! - a stream of [`TransportEvent`]s fed to [`Connection::deliver`](crate::Connection::deliver)
//!
//! The WebSocket implementation (tokio-tungstenite) lives in [`websocket`];
//! anything else can be plugged in through [`Endpoint::attach`](crate::Endpoint::attach).

use bytes::Bytes;

use crate::error::Result;

pub(crate) mod websocket;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Outbound message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
}

impl Message {
    /// Pick text when the bytes are valid UTF-8, binary otherwise.
    pub fn from_bytes(bytes: Bytes) -> Self {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Message::Text(text.to_string()),
            Err(_) => Message::Binary(bytes),
        }
    }

    /// Message content as bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Message::Text(text) => Bytes::from(text),
            Message::Binary(bytes) => bytes,
        }
    }
}

/// Something the transport reports about the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished, the socket is open.
    Open,
    /// Inbound text or binary message, normalized to bytes.
    Message(Bytes),
    /// Socket closed.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: Bytes,
    },
    /// Transport-level error. Does not close the socket by itself.
    Error(String),
}

/// Outbound side of a transport.
///
/// Sends are fire-and-forget: implementations queue the message and return.
pub trait TransportSink: Send + Sync + 'static {
    /// Queue one message.
    fn send(&self, message: Message) -> Result<()>;

    /// Start a closing handshake.
    fn close(&self, code: u16, reason: &str) -> Result<()>;
}
