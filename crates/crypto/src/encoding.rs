use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// URL-safe base64 with `=` padding stripped, as the finalize call expects.
pub fn base64url_nopad(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Inverse of [`base64url_nopad`].
pub fn decode_base64url_nopad(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded)
}
