//! One live socket with its registry, notification bus and lifecycle.
//!
//! A [`Connection`] is driven entirely by [`TransportEvent`]s passed to
//! [`Connection::deliver`]. The WebSocket driver does this from its reader
//! task; custom transports can do the same after
//! [`Endpoint::attach`](crate::Endpoint::attach).
//!
//! # Lifecycle
//!
//! ```text
//! attach ──► Connecting ──Open──► Open ──Close──► Closed
//!   │                                              │
//!   └─ accept                                      └─ close, removed from endpoint
//! ```
//!
//! Errors fire an `error` notification and leave the state alone.
//!
//! # Message handling
//!
//! With protocol framing on (something is registered), every inbound message
//! fires `messageBeforeEvents`, then is decoded and dispatched, then fires
//! `message`. With framing off it fires `notEventMessage` and `message`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::bus::{DualScope, EventBus, Notification, NotificationKind, SubscriptionId};
use crate::codec::Payload;
use crate::endpoint::{Endpoint, EndpointInner};
use crate::error::{EventwireError, Result};
use crate::handler::{
    EventHandler, EventOutcome, OperationHandler, RawEventHandler, Registry, TypedEventHandler,
};
use crate::protocol::{decode_frame, encode_event, encode_operation, Frame, Head};
use crate::transport::{Message, TransportEvent, TransportSink};
use crate::validate::Validator;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, transport not open yet.
    Connecting,
    /// Transport open.
    Open,
    /// Transport closed. Terminal.
    Closed,
}

struct Inner {
    id: u64,
    url: Option<String>,
    state: Mutex<ConnectionState>,
    sink: Arc<dyn TransportSink>,
    scope: DualScope,
    /// Endpoint registrations captured when the connection was created.
    inherited: Arc<Registry>,
    local: RwLock<Registry>,
    uses_framing: AtomicBool,
    endpoint: Weak<EndpointInner>,
}

/// Handle to one connection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        url: Option<String>,
        state: ConnectionState,
        sink: Arc<dyn TransportSink>,
        inherited: Arc<Registry>,
        parent_bus: EventBus,
        endpoint: Weak<EndpointInner>,
    ) -> Self {
        let uses_framing = !inherited.is_empty();
        Self {
            inner: Arc::new(Inner {
                id,
                url,
                state: Mutex::new(state),
                sink,
                scope: DualScope::new(EventBus::new(), parent_bus),
                inherited,
                local: RwLock::new(Registry::new()),
                uses_framing: AtomicBool::new(uses_framing),
                endpoint,
            }),
        }
    }

    /// Endpoint-unique connection id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// URL dialed for client connections, request path for accepted ones.
    pub fn url(&self) -> Option<&str> {
        self.inner.url.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether inbound messages are decoded as protocol frames.
    pub fn uses_framing(&self) -> bool {
        self.inner.uses_framing.load(Ordering::Acquire)
    }

    /// The endpoint that created or accepted this connection, if still alive.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.upgrade().map(Endpoint::from_inner)
    }

    /// Register a handler for the event `name` that receives the raw payload.
    ///
    /// Fails with [`EventwireError::InvalidName`] when `name` contains `$`.
    pub fn event<F>(&self, name: &str, handler: F) -> Result<&Self>
    where
        F: Fn(Bytes, &Connection) + Send + Sync + 'static,
    {
        self.add_event(name, Arc::new(RawEventHandler::new(handler)))
    }

    /// Register a handler for the event `name` behind a validator.
    ///
    /// The handler only runs for payloads the validator accepts at some tier;
    /// rejected payloads fire `parsingFailed` instead.
    pub fn event_with<T, V, F>(&self, name: &str, validator: V, handler: F) -> Result<&Self>
    where
        T: 'static,
        V: Validator<T>,
        F: Fn(T, &Connection, &V) + Send + Sync + 'static,
    {
        self.add_event(name, Arc::new(TypedEventHandler::new(validator, handler)))
    }

    fn add_event(&self, name: &str, handler: Arc<dyn EventHandler>) -> Result<&Self> {
        self.inner.local.write().add_event(name, handler)?;
        self.inner.uses_framing.store(true, Ordering::Release);
        Ok(self)
    }

    /// Register a handler for the operation `name`.
    ///
    /// Operation payloads are never validated. Unlike events, an operation
    /// frame with no handler is dropped without any notification.
    pub fn operation<F>(&self, name: &str, handler: F) -> Result<&Self>
    where
        F: Fn(Bytes, &str, &Connection) + Send + Sync + 'static,
    {
        let handler: Arc<dyn OperationHandler> = Arc::new(handler);
        self.inner.local.write().add_operation(name, handler)?;
        self.inner.uses_framing.store(true, Ordering::Release);
        Ok(self)
    }

    /// Subscribe to a notification on this connection only.
    pub fn on<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.scope.local().on(kind, callback)
    }

    /// Subscribe to the next notification of `kind` on this connection.
    pub fn once<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.scope.local().once(kind, callback)
    }

    /// Remove a subscription made with [`on`](Self::on) or [`once`](Self::once).
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.scope.local().off(id)
    }

    /// Send a raw payload with no framing.
    ///
    /// `Payload::Bytes` goes out as a binary message, anything else as text.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        let message = match payload.into() {
            Payload::Bytes(bytes) => Message::Binary(bytes),
            Payload::Text(text) => Message::Text(text),
            other => Message::Text(String::from_utf8_lossy(&other.stringify()).into_owned()),
        };
        self.push(message)
    }

    /// Send an event frame `$name\npayload`.
    pub fn emit(&self, name: &str, payload: impl Into<Payload>) -> Result<()> {
        let frame = encode_event(name, &payload.into())?;
        self.push(Message::from_bytes(frame))
    }

    /// Send an operation frame `$$name$config\npayload`.
    ///
    /// The config travels on the head line: a config that stringifies to
    /// something with a `\n`, or to bytes that are not UTF-8, fails with
    /// [`EventwireError::InvalidConfig`] and nothing is sent.
    pub fn emit_operation(
        &self,
        name: &str,
        config: impl Into<Payload>,
        payload: impl Into<Payload>,
    ) -> Result<()> {
        let frame = encode_operation(name, &config.into(), &payload.into())?;
        self.push(Message::from_bytes(frame))
    }

    /// Start the closing handshake.
    ///
    /// The state changes once the transport reports the close.
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(EventwireError::ConnectionClosed);
        }
        self.inner.sink.close(code, reason)
    }

    fn push(&self, message: Message) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(EventwireError::ConnectionClosed);
        }
        self.inner.sink.send(message)
    }

    /// Feed one transport event through the lifecycle.
    ///
    /// Everything after `Close` is ignored.
    pub fn deliver(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                {
                    let mut state = self.inner.state.lock();
                    if *state != ConnectionState::Connecting {
                        tracing::trace!(id = self.inner.id, state = ?*state, "ignoring open");
                        return;
                    }
                    *state = ConnectionState::Open;
                }
                tracing::debug!(id = self.inner.id, "connection open");
                self.notify(Notification::Open {
                    connection: self.clone(),
                });
            }
            TransportEvent::Message(bytes) => {
                if self.state() == ConnectionState::Closed {
                    tracing::trace!(id = self.inner.id, "ignoring message after close");
                    return;
                }
                self.handle_message(bytes);
            }
            TransportEvent::Close { code, reason } => {
                {
                    let mut state = self.inner.state.lock();
                    if *state == ConnectionState::Closed {
                        return;
                    }
                    *state = ConnectionState::Closed;
                }
                tracing::debug!(id = self.inner.id, code, "connection closed");
                self.notify(Notification::Close {
                    connection: self.clone(),
                    code,
                    reason,
                });
                if let Some(endpoint) = self.inner.endpoint.upgrade() {
                    endpoint.remove(self.inner.id);
                }
            }
            TransportEvent::Error(error) => {
                if self.state() == ConnectionState::Closed {
                    return;
                }
                tracing::debug!(id = self.inner.id, %error, "transport error");
                self.notify(Notification::Error {
                    connection: self.clone(),
                    error,
                });
            }
        }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.inner.scope.fire(notification);
    }

    fn handle_message(&self, message: Bytes) {
        if self.uses_framing() {
            self.notify(Notification::MessageBeforeEvents {
                payload: message.clone(),
                connection: self.clone(),
            });
            match decode_frame(&message) {
                Some(Frame {
                    head: head @ Head::Event { .. },
                    payload,
                }) => self.dispatch_event(head, payload),
                Some(Frame {
                    head: Head::Operation { name, config },
                    payload,
                }) => self.dispatch_operation(&name, &config, payload),
                None => self.notify(Notification::NotEventMessage {
                    payload: message.clone(),
                    connection: self.clone(),
                }),
            }
        } else {
            self.notify(Notification::NotEventMessage {
                payload: message.clone(),
                connection: self.clone(),
            });
        }

        self.notify(Notification::Message {
            payload: message,
            connection: self.clone(),
        });
    }

    fn dispatch_event(&self, head: Head, payload: Bytes) {
        // Collect under the lock, call without it.
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let local = self.inner.local.read();
            self.inner
                .inherited
                .event_handlers(head.name())
                .iter()
                .chain(local.event_handlers(head.name()))
                .cloned()
                .collect()
        };

        if handlers.is_empty() {
            tracing::debug!(id = self.inner.id, event = head.name(), "unknown event");
            self.notify(Notification::UnknownEvent {
                payload,
                connection: self.clone(),
                head,
            });
            return;
        }

        for handler in handlers {
            if let EventOutcome::Rejected { validator } = handler.call(&payload, self) {
                tracing::debug!(
                    id = self.inner.id,
                    event = head.name(),
                    validator = validator.as_deref().unwrap_or("default"),
                    "event payload rejected"
                );
                self.notify(Notification::ParsingFailed {
                    payload: payload.clone(),
                    connection: self.clone(),
                    validator,
                });
            }
        }
    }

    fn dispatch_operation(&self, name: &str, config: &str, payload: Bytes) {
        let handlers: Vec<Arc<dyn OperationHandler>> = {
            let local = self.inner.local.read();
            self.inner
                .inherited
                .operation_handlers(name)
                .iter()
                .chain(local.operation_handlers(name))
                .cloned()
                .collect()
        };

        if handlers.is_empty() {
            tracing::trace!(id = self.inner.id, operation = name, "dropping unknown operation");
            return;
        }

        for handler in handlers {
            handler.call(payload.clone(), config, self);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("uses_framing", &self.uses_framing())
            .finish()
    }
}
