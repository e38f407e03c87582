//! JSON body helpers.

use bytes::Bytes;

use crate::Result;

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use tether_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Grant { grant_type: String }
///
/// let grant = Grant { grant_type: "client_credentials".to_string() };
/// let bytes = to_json(&grant).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"grant_type":"client_credentials"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// Uses `serde_path_to_error` so a failure names the offending field.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}
