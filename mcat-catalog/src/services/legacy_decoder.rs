//! Legacy reference decoding
//!
//! Older snapshots stored non-durable references directly. Two kinds can
//! still yield bytes:
//!
//! - `data:[<mime>][;base64],<payload>` inline payloads
//! - `blob:` transient references that are still live in this process
//!
//! Everything else is unrecoverable and reported as
//! [`CatalogError::RehydrationDecode`].

use crate::error::{CatalogError, CatalogResult};
use crate::services::handle_registry::HandleRegistry;
use crate::services::path_resolver::truncate_for_log;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;

/// Bytes recovered from a legacy reference
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPayload {
    pub bytes: Vec<u8>,
    /// Media type declared by a `data:` URL, if any
    pub mime_type: Option<String>,
}

/// Decode a legacy reference into bytes
pub fn decode(reference: &str, registry: &HandleRegistry) -> CatalogResult<LegacyPayload> {
    let reference = reference.trim();
    let lower = reference.get(..5).map(|p| p.to_ascii_lowercase());

    match lower.as_deref() {
        Some("data:") => decode_data_url(&reference[5..]),
        Some("blob:") => registry
            .resolve_reference(reference)
            .map(|bytes| LegacyPayload {
                bytes: bytes.to_vec(),
                mime_type: None,
            })
            .ok_or_else(|| {
                CatalogError::RehydrationDecode(format!(
                    "transient reference no longer live: {}",
                    truncate_for_log(reference)
                ))
            }),
        _ => Err(CatalogError::RehydrationDecode(format!(
            "unsupported legacy reference: {}",
            truncate_for_log(reference)
        ))),
    }
}

fn decode_data_url(rest: &str) -> CatalogResult<LegacyPayload> {
    let (header, payload) = rest.split_once(',').ok_or_else(|| {
        CatalogError::RehydrationDecode("data URL missing ',' separator".to_string())
    })?;

    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_lowercase());
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        decode_base64(payload)?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    Ok(LegacyPayload { bytes, mime_type })
}

fn decode_base64(payload: &str) -> CatalogResult<Vec<u8>> {
    // Payloads may have been percent-encoded and wrapped
    let decoded = urlencoding::decode_binary(payload.as_bytes());
    let cleaned: Vec<u8> = decoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(bytes) = engine.decode(&cleaned) {
            return Ok(bytes);
        }
    }
    Err(CatalogError::RehydrationDecode(
        "data URL payload is not valid base64".to_string(),
    ))
}
