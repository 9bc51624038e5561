//! Unpadded base64url, tolerant of padding on input

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(bytes)
}

/// # Errors
/// Returns the decoder error message.
pub fn decode(value: &str) -> Result<Vec<u8>, String> {
    URL_SAFE_LENIENT.decode(value).map_err(|e| e.to_string())
}

/// Standard alphabet, used for certificates in JSON documents
///
/// # Errors
/// Returns the decoder error message.
pub fn decode_standard(value: &str) -> Result<Vec<u8>, String> {
    STANDARD.decode(value.trim()).map_err(|e| e.to_string())
}

#[must_use]
pub fn encode_standard(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
