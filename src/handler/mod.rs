//! Handler module - event and operation dispatch tables.
//!
//! Provides:
//! - [`Registry`] - maps names to handlers, duplicates append
//! - [`EventHandler`] - type-erased validator + handler pair
//! - [`OperationHandler`] - raw payload + config handler
//!
//! Endpoints keep their registry behind an `Arc` and connections capture it
//! when they are created, so endpoint registrations are replayed onto every
//! new connection without copying handlers.

mod registry;

pub use registry::{
    EventHandler, EventOutcome, OperationHandler, RawEventHandler, Registry, TypedEventHandler,
};
