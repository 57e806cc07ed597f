//! Codec Module
//!
//! Pure functions that turn envelopes into the text stored in a namespace
//! and back again.
//!
//! ## Pipeline
//!
//! ```text
//!            serialize                                  deserialize
//! Envelope ──────────────> JSON text ─┬──────────────────────────> Envelope
//!                                     │ obfuscate = true
//!                                     ▼
//!                         XOR keystream ──> base64 text
//! ```
//!
//! Obfuscation is a reversible XOR over the JSON bytes, cycling through the
//! bytes of the obfuscation key, followed by standard base64. It hides
//! payloads from casual inspection only and gives no confidentiality.

pub mod envelope;
pub mod value;

pub use envelope::Envelope;
pub use value::Value;

use crate::error::{StorageError, StorageResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `item` to text, obfuscating it with `key` when asked.
pub fn serialize<T: Serialize + ?Sized>(
    item: &T,
    obfuscate: bool,
    key: &str,
) -> StorageResult<String> {
    let json = serde_json::to_string(item)?;
    if !obfuscate {
        return Ok(json);
    }
    let masked = xor_keystream(json.as_bytes(), key.as_bytes());
    Ok(STANDARD.encode(masked))
}

/// Inverse of [`serialize`].
///
/// Fails on invalid base64, on bytes that are not UTF-8 after unmasking
/// (typically a wrong key) and on JSON that does not match `T`.
pub fn deserialize<T: DeserializeOwned>(
    text: &str,
    was_obfuscated: bool,
    key: &str,
) -> StorageResult<T> {
    if !was_obfuscated {
        return Ok(serde_json::from_str(text)?);
    }
    let masked = STANDARD.decode(text.trim())?;
    let unmasked = xor_keystream(&masked, key.as_bytes());
    let json = std::str::from_utf8(&unmasked)?;
    Ok(serde_json::from_str(json)?)
}

/// Decodes stored text into an envelope without knowing how it was written.
///
/// Plain envelopes are JSON objects and always start with `{`, a character
/// base64 never produces, so the first byte tells the two forms apart.
pub fn decode_envelope(text: &str, key: &str) -> StorageResult<Envelope> {
    let obfuscated = !text.trim_start().starts_with('{');
    deserialize(text, obfuscated, key).map_err(|err| match err {
        StorageError::Json(json) if json.is_data() => StorageError::Malformed(json.to_string()),
        other => other,
    })
}

/// Returns a copy of `value` with no shared structure.
pub fn deep_clone(value: &Value) -> Value {
    value.deep_clone()
}

/// XORs `input` with `key`, cycling the key. An empty key leaves the input as is.
fn xor_keystream(input: &[u8], key: &[u8]) -> BytesMut {
    if key.is_empty() {
        return BytesMut::from(input);
    }
    let mut out = BytesMut::with_capacity(input.len());
    for (byte, k) in input.iter().zip(key.iter().cycle()) {
        out.put_u8(byte ^ k);
    }
    out
}
