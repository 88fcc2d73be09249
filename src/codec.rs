//! base64url codec and byte-buffer helpers shared by the crypto modules.

use crate::error::PushError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Encode bytes as unpadded base64url.
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode unpadded base64url text.
///
/// Fails with [`PushError::MalformedInput`] on invalid characters or padding.
pub fn b64url_decode(text: &str) -> Result<Vec<u8>, PushError> {
    Ok(URL_SAFE_NO_PAD.decode(text)?)
}

/// Concatenate byte buffers into one allocation of exactly the summed length.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}
