//! Validator trait and the built-in validators.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// One interpretation of an inbound payload offered to a validator.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate<'a> {
    /// The raw payload bytes.
    Bytes(&'a Bytes),
    /// The payload decoded as UTF-8 text.
    Text(&'a str),
    /// The text parsed as JSON.
    Json(serde_json::Value),
}

impl Candidate<'_> {
    /// Short label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Candidate::Bytes(_) => "bytes",
            Candidate::Text(_) => "text",
            Candidate::Json(_) => "json",
        }
    }
}

/// Structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{path}] {message}")]
pub struct ValidationError {
    /// Path of the rejected value (empty for the payload root).
    pub path: String,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Checks and coerces a candidate value into `T`.
///
/// Validators must be pure: the pipeline may call one up to three times per
/// payload.
pub trait Validator<T>: Send + Sync + 'static {
    /// Accept or reject one candidate.
    fn validate(&self, candidate: Candidate<'_>, path: &str) -> Result<T, ValidationError>;

    /// Name reported in `ParsingFailed` notifications.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Default validator: the payload must already be the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesValidator;

impl Validator<Bytes> for BytesValidator {
    fn validate(&self, candidate: Candidate<'_>, path: &str) -> Result<Bytes, ValidationError> {
        match candidate {
            Candidate::Bytes(bytes) => Ok(bytes.clone()),
            other => Err(ValidationError::new(
                path,
                format!("is not buffer (got {})", other.kind()),
            )),
        }
    }

    fn name(&self) -> &str {
        "bytes"
    }
}

/// Accepts the payload as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextValidator;

impl Validator<String> for TextValidator {
    fn validate(&self, candidate: Candidate<'_>, path: &str) -> Result<String, ValidationError> {
        match candidate {
            Candidate::Text(text) => Ok(text.to_string()),
            other => Err(ValidationError::new(
                path,
                format!("is not string (got {})", other.kind()),
            )),
        }
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Deserializes the payload into `T` with serde.
///
/// At the text tier the text is offered as a JSON string, so `T = String`
/// accepts bare text while structured types wait for the JSON tier.
pub struct JsonValidator<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonValidator<T> {
    /// Create a new JSON validator.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonValidator")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + 'static> Validator<T> for JsonValidator<T> {
    fn validate(&self, candidate: Candidate<'_>, path: &str) -> Result<T, ValidationError> {
        let value = match candidate {
            Candidate::Bytes(_) => {
                return Err(ValidationError::new(path, "is not a JSON value (got bytes)"))
            }
            Candidate::Text(text) => serde_json::Value::String(text.to_string()),
            Candidate::Json(value) => value,
        };
        serde_json::from_value(value).map_err(|e| ValidationError::new(path, e.to_string()))
    }
}

/// Validator backed by a closure.
pub struct FnValidator<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl<T, F> Validator<T> for FnValidator<F>
where
    F: Fn(Candidate<'_>, &str) -> Result<T, ValidationError> + Send + Sync + 'static,
{
    fn validate(&self, candidate: Candidate<'_>, path: &str) -> Result<T, ValidationError> {
        (self.f)(candidate, path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a named validator.
///
/// # Example
///
/// ```
/// use eventwire::validate::{decode, validator_fn, Candidate, ValidationError};
/// use bytes::Bytes;
///
/// let even = validator_fn("even", |candidate: Candidate<'_>, path: &str| match candidate {
///     Candidate::Json(v) if v.as_i64().is_some_and(|n| n % 2 == 0) => Ok(v.as_i64().unwrap_or(0)),
///     _ => Err(ValidationError::new(path, "is not an even number")),
/// });
///
/// assert_eq!(decode(&Bytes::from_static(b"4"), &even), Some(4));
/// assert_eq!(decode(&Bytes::from_static(b"3"), &even), None);
/// ```
pub fn validator_fn<T, F>(name: impl Into<String>, f: F) -> FnValidator<F>
where
    F: Fn(Candidate<'_>, &str) -> Result<T, ValidationError> + Send + Sync + 'static,
{
    FnValidator {
        name: name.into(),
        f,
    }
}
