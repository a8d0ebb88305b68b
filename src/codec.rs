//! Serialization Codec
//!
//! Turns values into the bytes kept in the store and back. Each entry is a JSON
//! envelope that records the value's type name, when it was written and for how
//! long it stays valid.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::policy::Ttl;

// == Envelope ==
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEnvelope<V> {
    #[serde(rename = "@type")]
    type_tag: String,
    written_at: u64,
    ttl: Option<u64>,
    value: V,
}

// == Encoded ==
/// Bytes ready for the store, plus whether the payload was JSON `null`.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub is_null: bool,
}

// == Decoded ==
/// A value read back from the store with its envelope metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    /// Write time, Unix milliseconds
    pub written_at: u64,
    /// TTL in seconds, None = never expires
    pub ttl: Option<u64>,
}

impl<T> Decoded<T> {
    /// Expired once `now_ms >= written_at + ttl`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl {
            Some(ttl) => now_ms >= self.written_at.saturating_add(ttl.saturating_mul(1000)),
            None => false,
        }
    }
}

/// Type name recorded in the envelope.
pub fn type_tag<T: ?Sized>() -> &'static str {
    std::any::type_name::<T>()
}

// == Encode ==
/// Encodes a value into an envelope.
pub fn encode<T: Serialize>(value: &T, written_at: u64, ttl: Ttl) -> Result<Encoded> {
    let value = serde_json::to_value(value).map_err(|e| CacheError::Encode(e.to_string()))?;
    let is_null = value.is_null();
    let envelope = CacheEnvelope {
        type_tag: type_tag::<T>().to_string(),
        written_at,
        ttl: ttl.as_secs(),
        value,
    };
    let bytes = serde_json::to_vec(&envelope).map_err(|e| CacheError::Encode(e.to_string()))?;
    Ok(Encoded { bytes, is_null })
}

// == Decode ==
/// Decodes an envelope written for `T`.
///
/// Malformed bytes, a different recorded type or a value that no longer matches
/// `T`'s shape are all reported as [`CacheError::Decode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Decoded<T>> {
    let envelope: CacheEnvelope<Value> =
        serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(e.to_string()))?;

    let expected = type_tag::<T>();
    if envelope.type_tag != expected {
        return Err(CacheError::Decode(format!(
            "entry holds `{}`, expected `{}`",
            envelope.type_tag, expected
        )));
    }

    let value = serde_json::from_value(envelope.value)
        .map_err(|e| CacheError::Decode(format!("schema mismatch for `{}`: {}", expected, e)))?;

    Ok(Decoded {
        value,
        written_at: envelope.written_at,
        ttl: envelope.ttl,
    })
}
