//! Metadata and user-data payload normalization
//!
//! Payloads supplied by users may already be gzip+base64 encoded (the form
//! stored in guestinfo) or plain text. Everything is normalized to plain
//! text before processing and re-encoded deterministically before being
//! written, so the stored form is canonical.

use crate::CustomizationError;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::io::{Read, Write};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode `data` if it is gzip+base64, otherwise return it unchanged.
///
/// Input that is not base64, or whose decoded bytes are not gzip, is
/// treated as plain text. A payload that looks like gzip+base64 but cannot
/// be decompressed into UTF-8 is an error.
pub fn try_decode_gzip_base64(data: &str) -> Result<String, CustomizationError> {
    let Some(compressed) = decode_base64(data) else {
        return Ok(data.to_string());
    };

    if !compressed.starts_with(&GZIP_MAGIC) {
        return Ok(data.to_string());
    }

    debug!("Decompressing gzip+base64 payload");
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CustomizationError::decode("payload", format!("gzip: {}", e)))?;

    String::from_utf8(decompressed)
        .map_err(|e| CustomizationError::decode("payload", format!("utf-8: {}", e)))
}

/// Gzip and base64 encode `data`.
///
/// The gzip header carries no timestamp or file name, so the same input
/// always produces the same output.
pub fn encode_gzip_base64(data: &str) -> Result<String, CustomizationError> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    encoder
        .write_all(data.as_bytes())
        .map_err(|e| CustomizationError::encode("payload", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CustomizationError::encode("payload", e))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Standard base64 decode, ignoring embedded whitespace
fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .ok()
}
