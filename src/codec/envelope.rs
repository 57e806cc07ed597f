//! Item Envelope
//!
//! The record persisted under one full key:
//!
//! ```text
//! {"value": <value>, "expires": <ms since epoch> | null, "created": <ms since epoch>}
//! ```
//!
//! The shape is not versioned. Text that parses as JSON but lacks a `value`
//! field is rejected as malformed, and callers treat it as absent.

use crate::codec::value::Value;
use serde::{Deserialize, Serialize};

/// A stored value together with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The caller's data.
    pub value: Value,
    /// Absolute expiry in milliseconds, `None` = never expires.
    #[serde(default)]
    pub expires: Option<i64>,
    /// When the write that produced this envelope happened.
    #[serde(default)]
    pub created: i64,
}

impl Envelope {
    /// Wraps a value written at `created`.
    ///
    /// An expiry earlier than `created` is clamped so that
    /// `created <= expires` always holds for persisted envelopes.
    pub fn new(value: Value, created: i64, expires: Option<i64>) -> Self {
        Self {
            value,
            expires: expires.map(|exp| exp.max(created)),
            created,
        }
    }

    /// Returns true if this envelope never expires.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.expires.is_none()
    }
}
