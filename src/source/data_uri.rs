//! `data:` URI encoding and decoding (RFC 2397, base64 form only)

use crate::error::{Error, Result};
use base64::Engine;

const DEFAULT_MIME: &str = "text/plain;charset=US-ASCII";

/// Encode bytes as `data:<mime>;base64,<payload>`
pub fn encode(mime_type: &str, data: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(data);
    format!("data:{};base64,{}", mime_type, payload)
}

/// Decode a base64 data URI into its MIME type and bytes
pub fn decode(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUri {
            reason: "missing \"data:\" prefix".to_string(),
        })?;

    let (header, payload) = rest.split_once(',').ok_or_else(|| Error::InvalidDataUri {
        reason: "missing ',' separator".to_string(),
    })?;

    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::InvalidDataUri {
            reason: "only base64 data URIs are supported".to_string(),
        })?;

    let mime_type = if media_type.is_empty() {
        DEFAULT_MIME.to_string()
    } else {
        media_type.to_ascii_lowercase()
    };

    let data = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime_type, data))
}
