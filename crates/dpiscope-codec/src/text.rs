use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dpiscope_core::CodecError;

/// URL-safe base64 without padding.
pub fn to_text(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Inverse of [`to_text`]. Trailing `=` padding is tolerated.
pub fn from_text(token: &str) -> Result<Vec<u8>, CodecError> {
    let token = token.trim().trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| CodecError::MalformedToken(format!("not url-safe base64: {}", e)))
}
