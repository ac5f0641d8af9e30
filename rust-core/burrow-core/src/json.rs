//! # JSON Codec
//!
//! Request bodies are parsed with simd-json; responses are written with
//! serde_json.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse JSON bytes in place
///
/// simd-json rewrites the buffer while parsing, hence `&mut`.
///
/// # Errors
///
/// Returns `Error::InvalidBody` if the input is not valid JSON for `T`
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::InvalidBody {
        reason: e.to_string(),
    })
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if `value` cannot be represented as JSON
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
