//! Cache entry wire format: MessagePack, then standard base64
//!
//! The stored value is a text string so every store provider handles it the
//! same way.

use super::errors::{CacheError, CacheResult};
use super::headers::Headers;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One cached response variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl CacheEntry {
    pub fn new(status_code: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers,
            body: body.into(),
        }
    }
}

/// Encode an entry for storage
pub fn encode(entry: &CacheEntry) -> CacheResult<String> {
    let packed = rmp_serde::to_vec_named(entry)
        .map_err(|e| CacheError::Codec(format!("MessagePack encode failed: {}", e)))?;
    Ok(STANDARD.encode(packed))
}

/// Decode a stored value back into an entry
pub fn decode(encoded: &str) -> CacheResult<CacheEntry> {
    let packed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CacheError::Codec(format!("base64 decode failed: {}", e)))?;
    rmp_serde::from_slice(&packed)
        .map_err(|e| CacheError::Codec(format!("MessagePack decode failed: {}", e)))
}
