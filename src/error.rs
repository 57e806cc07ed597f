//! Error types for storage operations.
//!
//! These never cross the public [`WebStorage`](crate::storage::WebStorage)
//! surface: the engine maps every failure to a `false`, a `None` or a count
//! and logs it. Backends and the codec use them to report what went wrong.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading, writing or decoding stored items.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The namespace has no room left for the write.
    #[error("storage quota exceeded: needed {needed} bytes, {available} available")]
    QuotaExceeded {
        /// Size of the rejected write (key + value text).
        needed: usize,
        /// Space left in the namespace before the write.
        available: usize,
    },

    /// The underlying facility refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored text could not be turned back into bytes or UTF-8.
    #[error("decode error: {0}")]
    Decode(String),

    /// The stored text parsed, but not into an item envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<base64::DecodeError> for StorageError {
    fn from(err: base64::DecodeError) -> Self {
        StorageError::Decode(err.to_string())
    }
}

impl From<std::str::Utf8Error> for StorageError {
    fn from(err: std::str::Utf8Error) -> Self {
        StorageError::Decode(err.to_string())
    }
}
