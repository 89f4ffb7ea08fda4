//! Three-tier payload decoding.
//!
//! The receiver's validator decides what shape a payload has, so the decoder
//! offers every interpretation in a fixed order instead of guessing:
//!
//! 1. the raw bytes
//! 2. the bytes as UTF-8 text
//! 3. the text parsed as JSON
//!
//! The first candidate the validator accepts wins.

use bytes::Bytes;

use super::validator::{Candidate, Validator};

/// Path handed to validators for the payload root.
pub const ROOT_PATH: &str = "";

/// Decode `payload` with `validator`.
///
/// Returns `None` when every tier is rejected. Payloads that are not valid
/// UTF-8 only get the raw tier.
pub fn decode<T, V>(payload: &Bytes, validator: &V) -> Option<T>
where
    V: Validator<T> + ?Sized,
{
    if let Ok(value) = validator.validate(Candidate::Bytes(payload), ROOT_PATH) {
        return Some(value);
    }

    let text = std::str::from_utf8(payload).ok()?;
    if let Ok(value) = validator.validate(Candidate::Text(text), ROOT_PATH) {
        return Some(value);
    }

    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    match validator.validate(Candidate::Json(json), ROOT_PATH) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::trace!(validator = validator.name(), error = %e, "payload rejected by every tier");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{
        validator_fn, BytesValidator, JsonValidator, TextValidator, ValidationError,
    };
    use serde::Deserialize;

    #[test]
    fn test_raw_tier_wins_first() {
        let payload = Bytes::from_static(b"hello");
        assert_eq!(decode(&payload, &BytesValidator), Some(payload.clone()));
    }

    #[test]
    fn test_text_tier() {
        let payload = Bytes::from_static(b"hello");
        assert_eq!(decode(&payload, &TextValidator), Some("hello".to_string()));
    }

    #[test]
    fn test_json_tier() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        let payload = Bytes::from_static(br#"{"x": 1, "y": 2}"#);
        assert_eq!(
            decode(&payload, &JsonValidator::<Point>::new()),
            Some(Point { x: 1, y: 2 })
        );
        assert_eq!(
            decode(&Bytes::from_static(b"42"), &JsonValidator::<i32>::new()),
            Some(42)
        );
    }

    #[test]
    fn test_all_tiers_fail() {
        let payload = Bytes::from_static(b"not json");
        assert_eq!(decode(&payload, &JsonValidator::<i32>::new()), None);
    }

    #[test]
    fn test_invalid_utf8_skips_text_and_json() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let recorder = validator_fn("recorder", move |c: Candidate<'_>, path: &str| {
            log.lock().push(c.kind());
            Err::<(), _>(ValidationError::new(path, "rejected"))
        });

        let payload = Bytes::from_static(b"\xff\xfe");
        assert_eq!(decode(&payload, &recorder), None);
        assert_eq!(*seen.lock(), vec!["bytes"]);
        assert_eq!(decode(&payload, &TextValidator), None);
    }

    #[test]
    fn test_tiers_tried_in_order() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let recorder = validator_fn("recorder", move |c: Candidate<'_>, path: &str| {
            log.lock().push(c.kind());
            Err::<(), _>(ValidationError::new(path, "rejected"))
        });

        assert_eq!(decode(&Bytes::from_static(b"[1]"), &recorder), None);
        assert_eq!(*seen.lock(), vec!["bytes", "text", "json"]);
    }

    #[test]
    fn test_unparseable_json_stops_after_text() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let recorder = validator_fn("recorder", move |c: Candidate<'_>, path: &str| {
            log.lock().push(c.kind());
            Err::<(), _>(ValidationError::new(path, "rejected"))
        });

        assert_eq!(decode(&Bytes::from_static(b"{oops"), &recorder), None);
        assert_eq!(*seen.lock(), vec!["bytes", "text"]);
    }
}
