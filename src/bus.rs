//! Notification bus.
//!
//! An [`EventBus`] maps each [`NotificationKind`] to an ordered list of
//! subscribers. Delivery is synchronous and in subscription order. The lock is
//! released before any subscriber runs, so subscribers may subscribe or
//! unsubscribe from inside a callback; changes apply to the next emit.
//!
//! Every connection owns one bus and shares its endpoint's bus. A
//! notification is fired on the connection bus first and then, unchanged, on
//! the endpoint bus.
//!
//! # Example
//!
//! ```ignore
//! use eventwire::{Endpoint, NotificationKind};
//!
//! let endpoint = Endpoint::new();
//! endpoint.on(NotificationKind::UnknownEvent, |n| {
//!     tracing::warn!(connection = n.connection().id(), "unknown event");
//! });
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::protocol::Head;

/// Subscribable notification keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// A connection was created or accepted.
    Accept,
    /// The transport finished opening.
    Open,
    /// Any inbound message, after dispatch.
    Message,
    /// An inbound message, before frame decoding.
    MessageBeforeEvents,
    /// Inbound message that is not a protocol frame.
    NotEventMessage,
    /// Event frame with no registered handler.
    UnknownEvent,
    /// Event payload rejected by its validator.
    ParsingFailed,
    /// The transport closed.
    Close,
    /// The transport reported an error.
    Error,
}

/// A lifecycle or protocol notification.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Fired once when the connection is constructed.
    Accept {
        /// The new connection.
        connection: Connection,
    },
    /// Transport is open.
    Open {
        /// The opened connection.
        connection: Connection,
    },
    /// Fired for every inbound message once dispatch is done.
    Message {
        /// Whole message.
        payload: Bytes,
        /// Receiving connection.
        connection: Connection,
    },
    /// Fired for every inbound message before decoding, when framing is on.
    MessageBeforeEvents {
        /// Whole message.
        payload: Bytes,
        /// Receiving connection.
        connection: Connection,
    },
    /// Inbound message that could not be read as a frame.
    NotEventMessage {
        /// Whole message.
        payload: Bytes,
        /// Receiving connection.
        connection: Connection,
    },
    /// Event frame whose name has no handler.
    UnknownEvent {
        /// Frame payload.
        payload: Bytes,
        /// Receiving connection.
        connection: Connection,
        /// Parsed head.
        head: Head,
    },
    /// Event payload that every decode tier rejected.
    ParsingFailed {
        /// Frame payload.
        payload: Bytes,
        /// Receiving connection.
        connection: Connection,
        /// Name of the validator used; `None` for the default.
        validator: Option<String>,
    },
    /// Transport closed.
    Close {
        /// Closed connection.
        connection: Connection,
        /// WebSocket close code.
        code: u16,
        /// Close reason bytes.
        reason: Bytes,
    },
    /// Transport error.
    Error {
        /// Affected connection.
        connection: Connection,
        /// Error as reported by the transport.
        error: String,
    },
}

impl Notification {
    /// Key this notification is delivered under.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Accept { .. } => NotificationKind::Accept,
            Notification::Open { .. } => NotificationKind::Open,
            Notification::Message { .. } => NotificationKind::Message,
            Notification::MessageBeforeEvents { .. } => NotificationKind::MessageBeforeEvents,
            Notification::NotEventMessage { .. } => NotificationKind::NotEventMessage,
            Notification::UnknownEvent { .. } => NotificationKind::UnknownEvent,
            Notification::ParsingFailed { .. } => NotificationKind::ParsingFailed,
            Notification::Close { .. } => NotificationKind::Close,
            Notification::Error { .. } => NotificationKind::Error,
        }
    }

    /// Connection the notification is about.
    pub fn connection(&self) -> &Connection {
        match self {
            Notification::Accept { connection }
            | Notification::Open { connection }
            | Notification::Message { connection, .. }
            | Notification::MessageBeforeEvents { connection, .. }
            | Notification::NotEventMessage { connection, .. }
            | Notification::UnknownEvent { connection, .. }
            | Notification::ParsingFailed { connection, .. }
            | Notification::Close { connection, .. }
            | Notification::Error { connection, .. } => connection,
        }
    }

    /// Payload bytes carried by message-shaped notifications.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Notification::Message { payload, .. }
            | Notification::MessageBeforeEvents { payload, .. }
            | Notification::NotEventMessage { payload, .. }
            | Notification::UnknownEvent { payload, .. }
            | Notification::ParsingFailed { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Handle returned by `on`/`once`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber callback.
pub type Subscriber = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    once: bool,
    callback: Subscriber,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: HashMap<NotificationKind, Vec<Entry>>,
}

/// Synchronous, ordered publish/subscribe keyed by [`NotificationKind`].
///
/// Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every notification of `kind`.
    pub fn on<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(callback), false)
    }

    /// Subscribe to the next notification of `kind` only.
    pub fn once<F>(&self, kind: NotificationKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(callback), true)
    }

    fn subscribe(&self, kind: NotificationKind, callback: Subscriber, once: bool) -> SubscriptionId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state
            .subscribers
            .entry(kind)
            .or_default()
            .push(Entry { id, once, callback });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        for entries in state.subscribers.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of live subscribers for `kind`.
    pub fn listener_count(&self, kind: NotificationKind) -> usize {
        self.state
            .lock()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `notification` to the current subscribers of its kind.
    ///
    /// Returns how many subscribers were called.
    pub fn emit(&self, notification: &Notification) -> usize {
        let callbacks: Vec<Subscriber> = {
            let mut state = self.state.lock();
            let Some(entries) = state.subscribers.get_mut(&notification.kind()) else {
                return 0;
            };
            let callbacks = entries.iter().map(|e| e.callback.clone()).collect();
            entries.retain(|e| !e.once);
            callbacks
        };

        for callback in &callbacks {
            callback(notification);
        }
        callbacks.len()
    }
}

/// Connection bus paired with its endpoint bus.
#[derive(Clone, Default)]
pub(crate) struct DualScope {
    local: EventBus,
    parent: EventBus,
}

impl DualScope {
    pub(crate) fn new(local: EventBus, parent: EventBus) -> Self {
        Self { local, parent }
    }

    pub(crate) fn local(&self) -> &EventBus {
        &self.local
    }

    /// Fire on the connection scope, then on the endpoint scope.
    pub(crate) fn fire(&self, notification: Notification) {
        self.local.emit(&notification);
        self.parent.emit(&notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::detached_connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open(connection: &Connection) -> Notification {
        Notification::Open {
            connection: connection.clone(),
        }
    }

    #[test]
    fn test_on_receives_every_emit() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.on(NotificationKind::Open, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit(&open(&connection)), 1);
        assert_eq!(bus.emit(&open(&connection)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.once(NotificationKind::Open, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&open(&connection));
        bus.emit(&open(&connection));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(NotificationKind::Open), 0);
    }

    #[test]
    fn test_off_removes_subscription() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = bus.on(NotificationKind::Open, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.emit(&open(&connection)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        bus.on(NotificationKind::Close, |_| panic!("wrong key"));
        assert_eq!(bus.emit(&open(&connection)), 0);
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on(NotificationKind::Open, move |_| order.lock().push(i));
        }
        bus.emit(&open(&connection));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_subscribe_from_inside_callback() {
        let (connection, _sink) = detached_connection();
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        bus.once(NotificationKind::Open, move |_| {
            inner_bus.on(NotificationKind::Open, |_| {});
        });

        // the new subscriber is not called during the emit that added it
        assert_eq!(bus.emit(&open(&connection)), 1);
        assert_eq!(bus.listener_count(NotificationKind::Open), 1);
        assert_eq!(bus.emit(&open(&connection)), 1);
    }

    #[test]
    fn test_dual_scope_fires_local_then_parent() {
        let (connection, _sink) = detached_connection();
        let local = EventBus::new();
        let parent = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        parent.on(NotificationKind::Open, move |_| o.lock().push("parent"));
        let o = order.clone();
        local.on(NotificationKind::Open, move |_| o.lock().push("local"));

        DualScope::new(local, parent).fire(open(&connection));
        assert_eq!(*order.lock(), vec!["local", "parent"]);
    }

    #[test]
    fn test_notification_accessors() {
        let (connection, _sink) = detached_connection();
        let n = Notification::Message {
            payload: Bytes::from_static(b"x"),
            connection: connection.clone(),
        };
        assert_eq!(n.kind(), NotificationKind::Message);
        assert_eq!(n.connection().id(), connection.id());
        assert_eq!(n.payload().map(|b| &b[..]), Some(&b"x"[..]));
        assert!(open(&connection).payload().is_none());
    }
}
