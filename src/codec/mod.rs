//! Codec module - payload values and their wire representation.
//!
//! - [`Payload`] - outbound value with the canonical stringify rule
//!
//! Inbound payloads are never decoded here: they stay raw [`bytes::Bytes`]
//! until a validator picks an interpretation (see [`crate::validate`]).

mod payload;

pub use payload::Payload;
