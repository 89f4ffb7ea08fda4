//! Dedicated writer task for outbound messages.
//!
//! Every connection gets a [`WriterHandle`] that pushes onto an mpsc channel.
//! A single task owns the socket's write half, drains the channel and writes
//! messages in batches, flushing once per batch.
//!
//! # Architecture
//!
//! ```text
//! emit / send ─┐
//! handlers    ─┼─► mpsc::UnboundedSender<Outbound> ─► Writer Task ─► WebSocket
//! close       ─┘
//! ```
//!
//! Sends never wait: the connection is a fire-and-forget producer and any
//! flow control is left to the socket.

use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::error::{EventwireError, Result};
use crate::transport::{Message, TransportSink};

/// Maximum messages to feed before forcing a flush.
const MAX_BATCH_SIZE: usize = 64;

/// Item queued for the writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Data message.
    Message(Message),
    /// Close handshake; the writer stops after sending it.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl Outbound {
    fn into_ws(self) -> WsMessage {
        match self {
            Outbound::Message(Message::Text(text)) => WsMessage::Text(text.into()),
            Outbound::Message(Message::Binary(bytes)) => WsMessage::Binary(bytes),
            Outbound::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }

    fn is_close(&self) -> bool {
        matches!(self, Outbound::Close { .. })
    }
}

/// Handle for queueing messages on the writer task.
///
/// This is cheaply cloneable.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl WriterHandle {
    /// Queue an item. Fails once the writer task has stopped.
    pub fn push(&self, item: Outbound) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| EventwireError::ConnectionClosed)
    }
}

impl TransportSink for WriterHandle {
    fn send(&self, message: Message) -> Result<()> {
        self.push(Outbound::Message(message))
    }

    fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.push(Outbound::Close {
            code,
            reason: reason.to_string(),
        })
    }
}

/// Create a writer handle and the receiver the writer task drains.
///
/// The channel exists before the socket does, so messages queued while a
/// connection is still `Connecting` are written right after the handshake.
pub fn writer_channel() -> (WriterHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WriterHandle { tx }, rx)
}

/// Writer loop: drain `rx` into `sink` until a close is sent, the channel
/// closes, or the socket fails.
pub async fn run_writer<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut closing = first.is_close();
        if let Err(e) = sink.feed(first.into_ws()).await {
            tracing::warn!("WebSocket write failed: {}", e);
            return;
        }

        let mut batched = 1;
        while !closing && batched < MAX_BATCH_SIZE {
            let Ok(next) = rx.try_recv() else { break };
            closing = next.is_close();
            if let Err(e) = sink.feed(next.into_ws()).await {
                tracing::warn!("WebSocket write failed: {}", e);
                return;
            }
            batched += 1;
        }

        if let Err(e) = sink.flush().await {
            tracing::warn!("WebSocket flush failed: {}", e);
            return;
        }

        if closing {
            tracing::debug!("Writer sent close frame, stopping");
            return;
        }
    }

    // every handle dropped
    let _ = sink.close().await;
}
