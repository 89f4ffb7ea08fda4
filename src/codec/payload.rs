//! Outbound payload values and the canonical stringify rule.
//!
//! Every event payload, operation payload and operation config goes through
//! [`Payload::stringify`] before it is placed on the wire:
//!
//! | Value | Wire form |
//! |---|---|
//! | `Bytes` | as-is |
//! | `Text` | as-is |
//! | `Undefined` | `undefined` |
//! | `Number(NaN)` | `NaN` |
//! | `Number(±inf)` | `null` |
//! | `Bool`, `Json` | compact JSON |
//! | finite `Number` | shortest digits, exponent below `1e-6` and from `1e21` |
//!
//! # Example
//!
//! ```
//! use eventwire::codec::Payload;
//! use serde_json::json;
//!
//! assert_eq!(&Payload::from("hi").stringify()[..], b"hi");
//! assert_eq!(&Payload::Undefined.stringify()[..], b"undefined");
//! assert_eq!(&Payload::from(f64::NAN).stringify()[..], b"NaN");
//! assert_eq!(&Payload::from(json!({"a": 1})).stringify()[..], br#"{"a":1}"#);
//! ```

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// A value that can be sent as a payload or operation config.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No payload at all.
    #[default]
    Undefined,
    /// Binary data, sent verbatim.
    Bytes(Bytes),
    /// Plain text, sent verbatim.
    Text(String),
    /// Boolean, sent as `true`/`false`.
    Bool(bool),
    /// Number, sent in JSON notation (`NaN` for NaN).
    Number(f64),
    /// Structured value, sent as compact JSON.
    Json(serde_json::Value),
}

impl Payload {
    /// Build a JSON payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Apply the canonical stringify rule.
    pub fn stringify(&self) -> Bytes {
        match self {
            Payload::Undefined => Bytes::from_static(b"undefined"),
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Payload::Bool(true) => Bytes::from_static(b"true"),
            Payload::Bool(false) => Bytes::from_static(b"false"),
            Payload::Number(n) => Bytes::from(format_number(*n)),
            Payload::Json(value) => Bytes::from(value.to_string()),
        }
    }

    /// Whether this payload must travel as a binary message when sent raw.
    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Bytes(_))
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return "null".to_string();
    }
    if n == 0.0 {
        // -0.0 prints as 0 like JSON.
        return "0".to_string();
    }
    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        return exponent_form(n);
    }
    // Display never uses an exponent and drops the `.0` of whole numbers.
    format!("{}", n)
}

/// `1e+21`, `1.5e-7`: the sign is always spelled out.
fn exponent_form(n: f64) -> String {
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Number(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Number(value as f64)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Payload::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bytes_and_text_pass_through() {
        let raw: &[u8] = &[0, 159, 146, 150, b'\n'];
        assert_eq!(&Payload::from(raw).stringify()[..], raw);
        assert_eq!(&Payload::from("a$b\nc").stringify()[..], b"a$b\nc");
    }

    #[test]
    fn test_bytes_zero_copy() {
        let original = Bytes::from_static(b"static data");
        let out = Payload::from(original.clone()).stringify();
        assert_eq!(out.as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_undefined_and_none() {
        assert_eq!(&Payload::Undefined.stringify()[..], b"undefined");
        assert_eq!(&Payload::from(None::<&str>).stringify()[..], b"undefined");
        assert_eq!(&Payload::from(Some("x")).stringify()[..], b"x");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(&Payload::from(f64::NAN).stringify()[..], b"NaN");
        assert_eq!(&Payload::from(f64::INFINITY).stringify()[..], b"null");
        assert_eq!(&Payload::from(3.0).stringify()[..], b"3");
        assert_eq!(&Payload::from(-0.0).stringify()[..], b"0");
        assert_eq!(&Payload::from(2.5).stringify()[..], b"2.5");
        assert_eq!(&Payload::from(42i64).stringify()[..], b"42");
    }

    #[test]
    fn test_large_whole_numbers_keep_their_digits() {
        assert_eq!(
            &Payload::from(1e20).stringify()[..],
            b"100000000000000000000"
        );
        assert_eq!(
            &Payload::from(-9.3e18).stringify()[..],
            b"-9300000000000000000"
        );
        assert_eq!(
            &Payload::from(i64::MAX).stringify()[..],
            b"9223372036854776000"
        );
        assert_eq!(&Payload::from(1e21).stringify()[..], b"1e+21");
        assert_eq!(&Payload::from(-2.5e22).stringify()[..], b"-2.5e+22");
    }

    #[test]
    fn test_tiny_numbers_use_exponent() {
        assert_eq!(&Payload::from(1.5e-7).stringify()[..], b"1.5e-7");
        assert_eq!(&Payload::from(0.000001).stringify()[..], b"0.000001");
    }

    #[test]
    fn test_bool_and_json() {
        assert_eq!(&Payload::from(true).stringify()[..], b"true");
        assert_eq!(&Payload::from(false).stringify()[..], b"false");
        assert_eq!(
            &Payload::from(json!({"k": [1, "two"]})).stringify()[..],
            br#"{"k":[1,"two"]}"#
        );
        assert_eq!(&Payload::from(json!(null)).stringify()[..], b"null");
    }

    #[test]
    fn test_json_from_serialize() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let payload = Payload::json(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(&payload.stringify()[..], br#"{"x":1,"y":2}"#);
        assert!(!payload.is_binary());
        assert!(Payload::from(vec![1u8, 2]).is_binary());
    }
}
