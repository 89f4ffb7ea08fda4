//! # eventwire
//!
//! Named events and named operations framed over WebSocket connections.
//!
//! Every message on the socket is either a protocol frame or opaque data:
//!
//! ```text
//! $name\n<payload>             event, validated before the handler runs
//! $$name$config\n<payload>     operation, raw payload plus a config string
//! anything else                not an event message
//! ```
//!
//! ## Architecture
//!
//! - **Endpoint**: creates (`connect`) and accepts (`accept`, `serve`)
//!   connections; its registrations are replayed onto each new connection
//! - **Connection**: one socket, its own registrations and lifecycle
//! - **Notifications**: fired on the connection bus, then on the endpoint bus
//!
//! ## Example
//!
//! ```ignore
//! use eventwire::validate::JsonValidator;
//! use eventwire::{Endpoint, NotificationKind};
//!
//! #[tokio::main]
//! async fn main() -> eventwire::Result<()> {
//!     let client = Endpoint::new();
//!     client.event_with("count", JsonValidator::<u32>::new(), |n, conn, _| {
//!         let _ = conn.emit("doubled", i64::from(n) * 2);
//!     })?;
//!     client.on(NotificationKind::ParsingFailed, |n| {
//!         tracing::warn!(id = n.connection().id(), "bad payload");
//!     });
//!
//!     let conn = client.connect("ws://127.0.0.1:9000/").await?;
//!     conn.emit("hello", "world")?;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod validate;

mod connection;
mod endpoint;
mod writer;

pub use bus::{EventBus, Notification, NotificationKind, SubscriptionId};
pub use codec::Payload;
pub use config::EndpointConfig;
pub use connection::{Connection, ConnectionState};
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{EventwireError, Result};
