//! WebSocket driver built on tokio-tungstenite.
//!
//! Each socket is split in two tasks: the writer task (see
//! [`crate::writer`]) owns the sink half, the reader task owns the stream half
//! and feeds every inbound item to [`Connection::deliver`]. All dispatch runs
//! on the reader task, so frames from one socket are handled in order.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use super::{TransportEvent, CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use crate::connection::Connection;
use crate::writer::{run_writer, Outbound};

/// Spawn the reader and writer tasks for an open socket.
pub(crate) fn start<S>(
    stream: WebSocketStream<S>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    connection: Connection,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = stream.split();
    tokio::spawn(run_writer(sink, outbound));
    tokio::spawn(run_reader(stream, connection));
}

/// Reader loop: translate socket items into transport events.
///
/// Always ends with exactly one `Close` delivery: the peer's close code, 1005
/// for a close frame without status, 1006 when the socket just dropped.
pub(crate) async fn run_reader<St>(mut stream: St, connection: Connection)
where
    St: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let mut close: Option<(u16, Bytes)> = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(WsMessage::Text(text)) => {
                let bytes = Bytes::copy_from_slice(text.as_str().as_bytes());
                connection.deliver(TransportEvent::Message(bytes));
            }
            Ok(WsMessage::Binary(bytes)) => {
                connection.deliver(TransportEvent::Message(bytes));
            }
            Ok(WsMessage::Close(frame)) => {
                close = Some(match frame {
                    Some(frame) => (
                        u16::from(frame.code),
                        Bytes::copy_from_slice(frame.reason.as_str().as_bytes()),
                    ),
                    None => (CLOSE_NO_STATUS, Bytes::new()),
                });
                // keep polling so tungstenite flushes the close reply
            }
            // ping/pong are answered by tungstenite
            Ok(_) => {}
            Err(e) => {
                if close.is_none() {
                    tracing::warn!(id = connection.id(), "WebSocket read failed: {}", e);
                    connection.deliver(TransportEvent::Error(e.to_string()));
                }
                break;
            }
        }
    }

    let (code, reason) = close.unwrap_or((CLOSE_ABNORMAL, Bytes::new()));
    connection.deliver(TransportEvent::Close { code, reason });
}
