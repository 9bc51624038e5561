//! `WebAuthn` codec
//!
//! Decodes raw ceremony bytes into the [`data`](crate::data) model and
//! encodes them back deterministically. CBOR goes through `ciborium`, JSON
//! through `serde_json`.

pub mod attestation;
pub mod authenticator_data;
pub mod base64url;
pub mod cbor;
pub mod cose;

use crate::data::{
    AttestationObject, AuthenticationData, AuthenticationRequest, AuthenticatorData, ClientData,
    ClientExtensionOutputs, CoseKey, RegistrationData, RegistrationRequest,
};
use crate::error::VerificationError;

/// Decode `attestationObject` bytes
///
/// # Errors
/// Returns `DataConversion` for malformed input.
pub fn decode_attestation_object(bytes: &[u8]) -> Result<AttestationObject, VerificationError> {
    attestation::decode(bytes)
}

/// # Errors
/// Returns `DataConversion` if encoding fails.
pub fn encode_attestation_object(object: &AttestationObject) -> Result<Vec<u8>, VerificationError> {
    attestation::encode(object)
}

/// Decode `authenticatorData` bytes
///
/// # Errors
/// Returns `DataConversion` for malformed input.
pub fn decode_authenticator_data(bytes: &[u8]) -> Result<AuthenticatorData, VerificationError> {
    authenticator_data::decode(bytes)
}

/// # Errors
/// Returns `DataConversion` if encoding fails.
pub fn encode_authenticator_data(data: &AuthenticatorData) -> Result<Vec<u8>, VerificationError> {
    authenticator_data::encode(data)
}

/// Decode `clientDataJSON` bytes
///
/// # Errors
/// Returns `DataConversion` for invalid JSON, an unknown `type`, an undecodable
/// challenge or an unparsable origin.
pub fn decode_client_data(bytes: &[u8]) -> Result<ClientData, VerificationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| VerificationError::DataConversion(format!("clientDataJSON: {e}")))
}

/// # Errors
/// Returns `DataConversion` if serialization fails.
pub fn encode_client_data(client_data: &ClientData) -> Result<Vec<u8>, VerificationError> {
    Ok(serde_json::to_vec(client_data)?)
}

/// # Errors
/// Returns `DataConversion` for malformed COSE key bytes.
pub fn decode_cose_key(bytes: &[u8]) -> Result<CoseKey, VerificationError> {
    cose::decode(bytes)
}

/// # Errors
/// Returns `DataConversion` if encoding fails.
pub fn encode_cose_key(key: &CoseKey) -> Result<Vec<u8>, VerificationError> {
    cose::encode(key)
}

fn decode_client_extensions(
    json: Option<&str>,
) -> Result<ClientExtensionOutputs, VerificationError> {
    match json {
        None => Ok(ClientExtensionOutputs::new()),
        Some(text) if text.trim().is_empty() => Ok(ClientExtensionOutputs::new()),
        Some(text) => serde_json::from_str(text).map_err(|e| {
            VerificationError::DataConversion(format!("clientExtensionResults: {e}"))
        }),
    }
}

/// Parse a raw registration response
///
/// # Errors
/// Returns `DataConversion` if any part is malformed.
pub fn parse_registration(request: &RegistrationRequest) -> Result<RegistrationData, VerificationError> {
    Ok(RegistrationData {
        attestation_object: decode_attestation_object(&request.attestation_object)?,
        attestation_object_bytes: request.attestation_object.clone(),
        client_data: decode_client_data(&request.client_data_json)?,
        client_data_bytes: request.client_data_json.clone(),
        client_extensions: decode_client_extensions(request.client_extensions_json.as_deref())?,
        transports: request.transports.clone(),
    })
}

/// Parse a raw authentication response
///
/// # Errors
/// Returns `DataConversion` if any part is malformed.
pub fn parse_authentication(
    request: &AuthenticationRequest,
) -> Result<AuthenticationData, VerificationError> {
    Ok(AuthenticationData {
        credential_id: request.credential_id.clone(),
        user_handle: request.user_handle.clone(),
        authenticator_data: decode_authenticator_data(&request.authenticator_data)?,
        authenticator_data_bytes: request.authenticator_data.clone(),
        client_data: decode_client_data(&request.client_data_json)?,
        client_data_bytes: request.client_data_json.clone(),
        client_extensions: decode_client_extensions(request.client_extensions_json.as_deref())?,
        signature: request.signature.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClientDataType, TokenBindingStatus};

    const CLIENT_DATA: &str = r#"{"challenge":"tk31UH1ETGGTPj33OhOMzw","origin":"http://localhost:8080","tokenBinding":{"status":"not-supported"},"type":"webauthn.get"}"#;

    #[test]
    fn test_decode_client_data() {
        let client_data = decode_client_data(CLIENT_DATA.as_bytes()).unwrap();
        assert_eq!(client_data.client_data_type, ClientDataType::Get);
        assert_eq!(client_data.challenge.to_base64url(), "tk31UH1ETGGTPj33OhOMzw");
        assert_eq!(client_data.origin.as_str(), "http://localhost:8080");
        assert_eq!(
            client_data.token_binding.as_ref().map(|tb| tb.status),
            Some(TokenBindingStatus::NotSupported)
        );

        let encoded = encode_client_data(&client_data).unwrap();
        assert_eq!(decode_client_data(&encoded).unwrap(), client_data);
    }

    #[test]
    fn test_unknown_client_data_type_is_conversion_error() {
        let json = CLIENT_DATA.replace("webauthn.get", "payment.get");
        assert!(matches!(
            decode_client_data(json.as_bytes()),
            Err(VerificationError::DataConversion(_))
        ));
    }

    #[test]
    fn test_cross_origin_fields_are_preserved() {
        let json = r#"{"type":"webauthn.create","challenge":"AAEC","origin":"https://rp.example","crossOrigin":true,"topOrigin":"https://top.example"}"#;
        let client_data = decode_client_data(json.as_bytes()).unwrap();
        assert_eq!(client_data.cross_origin, Some(true));
        assert_eq!(
            client_data.top_origin.map(|o| o.to_string()),
            Some("https://top.example".to_string())
        );
    }

    #[test]
    fn test_client_extensions_parsing() {
        assert!(decode_client_extensions(None).unwrap().is_empty());
        let outputs = decode_client_extensions(Some(r#"{"credProps":{"rk":true}}"#)).unwrap();
        assert!(outputs.contains_key("credProps"));
        assert!(decode_client_extensions(Some("[1]")).is_err());
    }
}
