//! Validate module - payload validation and coercion.
//!
//! Provides:
//! - [`Validator`] - checks a [`Candidate`] and produces a typed value
//! - [`decode`] - the raw → text → JSON fallback pipeline
//! - Built-in validators: [`BytesValidator`], [`TextValidator`],
//!   [`JsonValidator`], and closures via [`validator_fn`]
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use eventwire::validate::{decode, JsonValidator, TextValidator};
//!
//! let payload = Bytes::from_static(b"[1, 2, 3]");
//! assert_eq!(decode(&payload, &TextValidator), Some("[1, 2, 3]".to_string()));
//! assert_eq!(decode(&payload, &JsonValidator::<Vec<u8>>::new()), Some(vec![1, 2, 3]));
//! ```

mod pipeline;
mod validator;

pub use pipeline::{decode, ROOT_PATH};
pub use validator::{
    validator_fn, BytesValidator, Candidate, FnValidator, JsonValidator, TextValidator,
    ValidationError, Validator,
};
