//! Protocol module - head grammar and framing.
//!
//! This module implements the text framing used on top of the socket:
//! - Head line parsing (`$event`, `$$operation$config`)
//! - Frame split/decode with a binary-safe payload tail
//! - Outbound event and operation frame encoding

mod frame;
mod head;

pub use frame::{decode_frame, encode_event, encode_operation, split_message, Frame};
pub use head::{parse_head, Head, SENTINEL};
