//! Handler registry for dispatching events and operations by name.
//!
//! Names are free-form strings chosen by the application, so handlers are
//! stored type-erased behind [`EventHandler`] and [`OperationHandler`].
//! Registering a name twice appends: every handler for a name runs, in
//! registration order.
//!
//! # Example
//!
//! ```ignore
//! use eventwire::handler::{Registry, RawEventHandler};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.add_event("greet", Arc::new(RawEventHandler::new(|payload, _conn| {
//!     println!("{:?}", payload);
//! })))?;
//! assert_eq!(registry.event_handlers("greet").len(), 1);
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{check_name, Result};
use crate::validate::{decode, BytesValidator, Validator};

/// Result of running one event handler on one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The payload was accepted and the handler ran.
    Handled,
    /// Every decode tier was rejected; the handler did not run.
    Rejected {
        /// Validator name, `None` for the default.
        validator: Option<String>,
    },
}

/// Type-erased event handler with its validator.
pub trait EventHandler: Send + Sync + 'static {
    /// Validate `payload` and, on success, run the handler.
    fn call(&self, payload: &Bytes, connection: &Connection) -> EventOutcome;
}

/// Event handler using the default raw-bytes validator.
pub struct RawEventHandler<F> {
    handler: F,
}

impl<F> RawEventHandler<F>
where
    F: Fn(Bytes, &Connection) + Send + Sync + 'static,
{
    /// Create a new raw handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> EventHandler for RawEventHandler<F>
where
    F: Fn(Bytes, &Connection) + Send + Sync + 'static,
{
    fn call(&self, payload: &Bytes, connection: &Connection) -> EventOutcome {
        match decode(payload, &BytesValidator) {
            Some(bytes) => {
                (self.handler)(bytes, connection);
                EventOutcome::Handled
            }
            None => EventOutcome::Rejected { validator: None },
        }
    }
}

/// Event handler that validates the payload into `T` first.
pub struct TypedEventHandler<F, V, T> {
    handler: F,
    validator: V,
    _phantom: PhantomData<fn(T)>,
}

impl<F, V, T> TypedEventHandler<F, V, T>
where
    F: Fn(T, &Connection, &V) + Send + Sync + 'static,
    V: Validator<T>,
    T: 'static,
{
    /// Create a new typed handler.
    pub fn new(validator: V, handler: F) -> Self {
        Self {
            handler,
            validator,
            _phantom: PhantomData,
        }
    }
}

impl<F, V, T> EventHandler for TypedEventHandler<F, V, T>
where
    F: Fn(T, &Connection, &V) + Send + Sync + 'static,
    V: Validator<T>,
    T: 'static,
{
    fn call(&self, payload: &Bytes, connection: &Connection) -> EventOutcome {
        match decode(payload, &self.validator) {
            Some(value) => {
                (self.handler)(value, connection, &self.validator);
                EventOutcome::Handled
            }
            None => EventOutcome::Rejected {
                validator: Some(self.validator.name().to_string()),
            },
        }
    }
}

/// Operation handler: raw payload, config string, connection.
pub trait OperationHandler: Send + Sync + 'static {
    /// Run the handler.
    fn call(&self, payload: Bytes, config: &str, connection: &Connection);
}

impl<F> OperationHandler for F
where
    F: Fn(Bytes, &str, &Connection) + Send + Sync + 'static,
{
    fn call(&self, payload: Bytes, config: &str, connection: &Connection) {
        self(payload, config, connection)
    }
}

/// Registry mapping names to handlers.
#[derive(Clone, Default)]
pub struct Registry {
    /// Event handlers by trimmed name.
    events: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    /// Operation handlers by trimmed name.
    operations: HashMap<String, Vec<Arc<dyn OperationHandler>>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event handler.
    ///
    /// The name is trimmed; names containing `$` are rejected.
    pub fn add_event(&mut self, name: &str, handler: Arc<dyn EventHandler>) -> Result<()> {
        let name = name.trim();
        check_name(name)?;
        self.events.entry(name.to_string()).or_default().push(handler);
        Ok(())
    }

    /// Register an operation handler.
    pub fn add_operation(&mut self, name: &str, handler: Arc<dyn OperationHandler>) -> Result<()> {
        let name = name.trim();
        check_name(name)?;
        self.operations
            .entry(name.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Handlers registered for an event name.
    pub fn event_handlers(&self, name: &str) -> &[Arc<dyn EventHandler>] {
        self.events.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Handlers registered for an operation name.
    pub fn operation_handlers(&self, name: &str) -> &[Arc<dyn OperationHandler>] {
        self.operations.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Check whether an event name has at least one handler.
    pub fn has_event(&self, name: &str) -> bool {
        !self.event_handlers(name).is_empty()
    }

    /// Check whether anything at all is registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.operations.is_empty()
    }

    /// Registered event names.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// Registered operation names.
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }
}
