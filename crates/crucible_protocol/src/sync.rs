//! Encoding for the template snapshot carried by `sync_config`.
//!
//! The snapshot can span dozens of template definitions, so it is shipped
//! compressed: JSON, gzipped, then base64 so it embeds in the message as a
//! plain string field.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors from snapshot encode/decode.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize snapshot: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("snapshot is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("snapshot compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Serializes `value` to JSON, gzips it, and base64-encodes the result.
pub fn encode_snapshot<T: Serialize>(value: &T) -> Result<String, SyncError> {
    let json = serde_json::to_vec(value).map_err(SyncError::Serialize)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    Ok(BASE64.encode(compressed))
}

/// Reverses [`encode_snapshot`].
pub fn decode_snapshot<T: DeserializeOwned>(data: &str) -> Result<T, SyncError> {
    let compressed = BASE64.decode(data)?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;

    serde_json::from_slice(&json).map_err(SyncError::Deserialize)
}
