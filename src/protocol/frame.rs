//! Frame struct with decode/encode helpers.
//!
//! A frame is a head line, a `\n`, and an opaque payload. The payload keeps
//! its bytes verbatim (it may contain further newlines or binary data) and is
//! shared zero-copy via `bytes::Bytes`.
//!
//! # Example
//!
//! ```
//! use eventwire::codec::Payload;
//! use eventwire::protocol::{decode_frame, encode_event, Head};
//!
//! let wire = encode_event("greet", &Payload::from("hello")).unwrap();
//! assert_eq!(&wire[..], b"$greet\nhello");
//!
//! let frame = decode_frame(&wire).unwrap();
//! assert_eq!(frame.head, Head::Event { name: "greet".into() });
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::head::{parse_head, Head};
use crate::codec::Payload;
use crate::error::{check_name, EventwireError, Result};

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Parsed head line.
    pub head: Head,
    /// Payload bytes (zero-copy slice of the received message).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from head and payload.
    pub fn new(head: Head, payload: Bytes) -> Self {
        Self { head, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode the frame as `head \n payload`.
    pub fn encode(&self) -> Bytes {
        let head = self.head.to_string();
        let mut buf = BytesMut::with_capacity(head.len() + 1 + self.payload.len());
        buf.put_slice(head.as_bytes());
        buf.put_u8(b'\n');
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Split a raw message into head line and payload on the first `\n`.
///
/// A message without any newline is all head and an empty payload.
pub fn split_message(message: &Bytes) -> (Bytes, Bytes) {
    match message.iter().position(|&b| b == b'\n') {
        Some(at) => (message.slice(..at), message.slice(at + 1..)),
        None => (message.clone(), Bytes::new()),
    }
}

/// Decode a raw message into a frame.
///
/// Returns `None` when the message is not a protocol frame: the head is not
/// valid UTF-8, or it does not parse as an event or operation head.
pub fn decode_frame(message: &Bytes) -> Option<Frame> {
    let (head_line, payload) = split_message(message);
    let head_line = std::str::from_utf8(&head_line).ok()?;
    let head = parse_head(head_line)?;
    Some(Frame::new(head, payload))
}

/// Build an event frame: `$name\npayload`.
///
/// Fails with [`EventwireError::InvalidName`](crate::EventwireError::InvalidName)
/// when `name` contains `$`.
pub fn encode_event(name: &str, payload: &Payload) -> Result<Bytes> {
    check_name(name)?;
    let head = Head::Event {
        name: name.to_string(),
    };
    Ok(Frame::new(head, payload.stringify()).encode())
}

/// Build an operation frame: `$$name$config\npayload`.
///
/// The config goes through the same stringify rule as the payload; it may
/// itself contain `$`. It ends up on the head line, so a config that is not
/// UTF-8 or contains `\n` fails with
/// [`EventwireError::InvalidConfig`](crate::EventwireError::InvalidConfig).
pub fn encode_operation(name: &str, config: &Payload, payload: &Payload) -> Result<Bytes> {
    check_name(name)?;
    let config = config.stringify();
    let config = match std::str::from_utf8(&config) {
        Ok(text) if !text.contains('\n') => text.to_string(),
        _ => {
            return Err(EventwireError::InvalidConfig(
                String::from_utf8_lossy(&config).into_owned(),
            ))
        }
    };
    let head = Head::Operation {
        name: name.to_string(),
        config,
    };
    Ok(Frame::new(head, payload.stringify()).encode())
}
