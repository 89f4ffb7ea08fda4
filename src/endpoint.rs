//! Endpoint: creates and accepts connections and shares registrations.
//!
//! Handlers registered on an [`Endpoint`] are replayed onto every connection
//! it creates afterwards, and every connection notification is mirrored on the
//! endpoint bus.
//!
//! # Example
//!
//! ```ignore
//! use eventwire::{Endpoint, NotificationKind};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> eventwire::Result<()> {
//!     let server = Endpoint::new();
//!     server.event("greet", |payload, conn| {
//!         let _ = conn.emit("greeted", payload);
//!     })?;
//!     server.on(NotificationKind::UnknownEvent, |n| {
//!         tracing::warn!(id = n.connection().id(), "unknown event");
//!     });
//!
//!     let listener = TcpListener::bind("127.0.0.1:9000").await?;
//!     server.serve(listener).await
//! }
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::bus::{EventBus, Notification, NotificationKind, SubscriptionId};
use crate::codec::Payload;
use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::{EventwireError, Result};
use crate::handler::{OperationHandler, RawEventHandler, Registry, TypedEventHandler};
use crate::transport::{websocket, TransportEvent, TransportSink, CLOSE_ABNORMAL};
use crate::validate::Validator;
use crate::writer::writer_channel;

pub(crate) struct EndpointInner {
    config: EndpointConfig,
    bus: EventBus,
    /// Copy-on-write: connections keep the `Arc` they were created with.
    registry: RwLock<Arc<Registry>>,
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
}

impl EndpointInner {
    pub(crate) fn remove(&self, id: u64) {
        self.connections.lock().remove(&id);
    }
}

/// Builder for an [`Endpoint`].
#[derive(Debug, Clone, Default)]
pub struct EndpointBuilder {
    config: EndpointConfig,
}

impl EndpointBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest inbound message; `None` disables the limit.
    ///
    /// Default: 64 MiB
    pub fn max_message_size(mut self, size: Option<usize>) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the largest inbound frame; `None` disables the limit.
    ///
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: Option<usize>) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the client handshake timeout.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set `TCP_NODELAY` on sockets.
    ///
    /// Default: true
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Build the endpoint.
    pub fn build(self) -> Endpoint {
        Endpoint::with_config(self.config)
    }
}

/// Factory and acceptor of connections.
///
/// Cheap to clone; clones share registrations, subscribers and connections.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint {
    /// Create an endpoint with default settings.
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    /// Create a new endpoint builder.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// Create an endpoint with explicit settings.
    pub fn with_config(config: EndpointConfig) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                config,
                bus: EventBus::new(),
                registry: RwLock::new(Arc::new(Registry::new())),
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EndpointInner>) -> Self {
        Self { inner }
    }

    /// Settings in effect.
    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Register an event handler for every future connection.
    ///
    /// Connections that already exist are not affected.
    pub fn event<F>(&self, name: &str, handler: F) -> Result<&Self>
    where
        F: Fn(Bytes, &Connection) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.write();
        Arc::make_mut(&mut *registry).add_event(name, Arc::new(RawEventHandler::new(handler)))?;
        Ok(self)
    }

    /// Register a validated event handler for every future connection.
    pub fn event_with<T, V, F>(&self, name: &str, validator: V, handler: F) -> Result<&Self>
    where
        T: 'static,
        V: Validator<T>,
        F: Fn(T, &Connection, &V) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.write();
        Arc::make_mut(&mut *registry)
            .add_event(name, Arc::new(TypedEventHandler::new(validator, handler)))?;
        Ok(self)
    }

    /// Register an operation handler for every future connection.
    pub fn operation<F>(&self, name: &str, handler: F) -> Result<&Self>
    where
        F: Fn(Bytes, &str, &Connection) + Send + Sync + 'static,
    {
        let handler: Arc<dyn OperationHandler> = Arc::new(handler);
        let mut registry = self.inner.registry.write();
        Arc::make_mut(&mut *registry).add_operation(name, handler)?;
        Ok(self)
    }

    /// Subscribe to a notification from any connection of this endpoint.
    pub fn on<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, callback)
    }

    /// Subscribe to the next notification of `kind` from any connection.
    pub fn once<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.bus.once(kind, callback)
    }

    /// Remove an endpoint subscription.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.bus.off(id)
    }

    /// Live connections, oldest first.
    pub fn connections(&self) -> Vec<Connection> {
        let mut connections: Vec<Connection> =
            self.inner.connections.lock().values().cloned().collect();
        connections.sort_by_key(Connection::id);
        connections
    }

    /// Create a connection on top of any transport.
    ///
    /// The caller drives it with [`Connection::deliver`]. `accept` fires
    /// before this returns.
    pub fn attach(
        &self,
        sink: Arc<dyn TransportSink>,
        state: ConnectionState,
        url: Option<String>,
    ) -> Connection {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inherited = Arc::clone(&self.inner.registry.read());
        let connection = Connection::new(
            id,
            url,
            state,
            sink,
            inherited,
            self.inner.bus.clone(),
            Arc::downgrade(&self.inner),
        );
        self.inner.connections.lock().insert(id, connection.clone());

        tracing::debug!(id, url = ?connection.url(), "connection attached");
        connection.notify(Notification::Accept {
            connection: connection.clone(),
        });
        connection
    }

    /// Open a WebSocket connection to `url`.
    ///
    /// Resolves once the socket is open.
    pub async fn connect(&self, url: &str) -> Result<Connection> {
        self.connect_with(url, Payload::Undefined).await
    }

    /// Open a WebSocket connection and send `initial` raw right after open.
    ///
    /// `Payload::Undefined` sends nothing. On failure the connection fires
    /// `error` and `close` before the error is returned.
    pub async fn connect_with(&self, url: &str, initial: impl Into<Payload>) -> Result<Connection> {
        let (writer, rx) = writer_channel();
        let connection = self.attach(
            Arc::new(writer),
            ConnectionState::Connecting,
            Some(url.to_string()),
        );

        let timeout = self.inner.config.connect_timeout;
        let handshake = tokio_tungstenite::connect_async_with_config(
            url,
            Some(self.inner.config.websocket_config()),
            self.inner.config.nodelay,
        );
        let error = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok((stream, _response))) => {
                connection.deliver(TransportEvent::Open);
                websocket::start(stream, rx, connection.clone());

                let initial = initial.into();
                if !matches!(initial, Payload::Undefined) {
                    connection.send(initial)?;
                }
                return Ok(connection);
            }
            Ok(Err(e)) => EventwireError::from(e),
            Err(_) => EventwireError::ConnectTimeout(timeout),
        };

        tracing::debug!(url, %error, "connect failed");
        connection.deliver(TransportEvent::Error(error.to_string()));
        connection.deliver(TransportEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: Bytes::new(),
        });
        Err(error)
    }

    /// Run the server handshake on an accepted stream.
    ///
    /// The request path becomes the connection's url.
    pub async fn accept<S>(&self, stream: S) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut path = None;
        let capture = |request: &Request, response: Response| {
            path = Some(request.uri().to_string());
            Ok::<_, ErrorResponse>(response)
        };
        let stream = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            capture,
            Some(self.inner.config.websocket_config()),
        )
        .await?;

        let (writer, rx) = writer_channel();
        let connection = self.attach(Arc::new(writer), ConnectionState::Connecting, path);
        connection.deliver(TransportEvent::Open);
        websocket::start(stream, rx, connection.clone());
        Ok(connection)
    }

    /// Accept WebSocket clients from `listener` until it fails for good.
    ///
    /// Each handshake runs on its own task; failed handshakes are logged.
    /// Accept errors that concern a single client or a passing resource
    /// shortage are logged and retried after a short pause. Only errors
    /// that leave the listener unusable end the loop.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_fatal_accept_error(&e) => {
                    tracing::error!("Listener failed: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            if self.inner.config.nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }
            }

            let endpoint = self.clone();
            tokio::spawn(async move {
                match endpoint.accept(stream).await {
                    Ok(connection) => {
                        tracing::debug!(id = connection.id(), %peer, "client connected");
                    }
                    Err(e) => {
                        tracing::error!("WebSocket handshake with {} failed: {}", peer, e);
                    }
                }
            });
        }
    }
}

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept errors that no retry will fix.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported
    )
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.inner.config)
            .field("connections", &self.inner.connections.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::RecordingSink;

    #[test]
    fn test_transient_accept_errors_keep_serving() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
            io::ErrorKind::OutOfMemory,
        ] {
            assert!(!is_fatal_accept_error(&io::Error::from(kind)), "{:?}", kind);
        }
        // EMFILE has no stable kind of its own
        assert!(!is_fatal_accept_error(&io::Error::from_raw_os_error(24)));
    }

    #[test]
    fn test_broken_listener_stops_serving() {
        for kind in [io::ErrorKind::InvalidInput, io::ErrorKind::PermissionDenied] {
            assert!(is_fatal_accept_error(&io::Error::from(kind)), "{:?}", kind);
        }
    }

    #[test]
    fn test_builder_sets_config() {
        let endpoint = Endpoint::builder()
            .max_message_size(Some(1 << 10))
            .max_frame_size(None)
            .connect_timeout(Duration::from_millis(250))
            .nodelay(false)
            .build();

        let config = endpoint.config();
        assert_eq!(config.max_message_size, Some(1 << 10));
        assert_eq!(config.max_frame_size, None);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(!config.nodelay);
    }

    #[test]
    fn test_registrations_snapshot_at_attach() {
        let endpoint = Endpoint::new();
        let early = endpoint.attach(Arc::new(RecordingSink::default()), ConnectionState::Open, None);
        endpoint.event("greet", |_, _| {}).unwrap();
        let late = endpoint.attach(Arc::new(RecordingSink::default()), ConnectionState::Open, None);

        assert!(!early.uses_framing());
        assert!(late.uses_framing());
    }

    #[test]
    fn test_endpoint_operation_replayed() {
        let endpoint = Endpoint::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        endpoint
            .operation("upload", move |payload, config, conn| {
                s.lock().push((payload, config.to_string(), conn.id()))
            })
            .unwrap();

        let connection = endpoint.attach(Arc::new(RecordingSink::default()), ConnectionState::Open, None);
        connection.deliver(TransportEvent::Message(Bytes::from_static(b"$$upload$a$b\nxyz")));

        assert_eq!(
            *seen.lock(),
            vec![(Bytes::from_static(b"xyz"), "a$b".to_string(), connection.id())]
        );
    }

    #[test]
    fn test_invalid_endpoint_names_rejected() {
        let endpoint = Endpoint::new();
        assert!(endpoint.event("a$", |_, _| {}).is_err());
        assert!(endpoint.operation("$", |_, _, _| {}).is_err());
    }

    #[test]
    fn test_connection_endpoint_handle() {
        let endpoint = Endpoint::new();
        let connection = endpoint.attach(Arc::new(RecordingSink::default()), ConnectionState::Open, None);
        let back = connection.endpoint().unwrap();
        assert_eq!(back.connections()[0].id(), connection.id());

        drop(back);
        drop(endpoint);
        assert!(connection.endpoint().is_none());
    }

    #[test]
    fn test_endpoint_off() {
        let endpoint = Endpoint::new();
        let id = endpoint.on(NotificationKind::Accept, |_| panic!("unsubscribed"));
        assert!(endpoint.off(id));
        endpoint.attach(Arc::new(RecordingSink::default()), ConnectionState::Open, None);
    }

    #[tokio::test]
    async fn test_connect_failure_fires_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        for kind in [NotificationKind::Error, NotificationKind::Close] {
            let k = kinds.clone();
            endpoint.on(kind, move |n| k.lock().push(n.kind()));
        }

        let result = endpoint.connect(&format!("ws://{}", addr)).await;
        assert!(result.is_err());
        assert_eq!(
            *kinds.lock(),
            vec![NotificationKind::Error, NotificationKind::Close]
        );
        assert!(endpoint.connections().is_empty());
    }
}
