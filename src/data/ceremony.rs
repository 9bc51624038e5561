//! Ceremony inputs and outputs
//!
//! Server-side expectations ([`ServerProperty`], parameters), raw browser
//! responses (requests), parsed working sets (data) and the credential
//! record a caller persists after registration.

use std::collections::HashSet;

use serde::Deserialize;

use crate::codec::base64url;
use crate::data::attestation::{AttestationObject, AttestationType};
use crate::data::authenticator_data::{Aaguid, AuthenticatorData};
use crate::data::client_data::{Challenge, ClientData};
use crate::data::cose::{CoseAlgorithm, CoseKey};
use crate::data::origin::Origin;
use crate::error::VerificationError;

/// Client extension outputs (`getClientExtensionResults()`)
pub type ClientExtensionOutputs = serde_json::Map<String, serde_json::Value>;

/// What the relying party expects to see in a ceremony
#[derive(Debug, Clone)]
pub struct ServerProperty {
    pub rp_id: String,
    pub origins: HashSet<Origin>,
    pub challenge: Challenge,
    pub token_binding_id: Option<Vec<u8>>,
}

impl ServerProperty {
    #[must_use]
    pub fn new(origin: Origin, rp_id: impl Into<String>, challenge: Challenge) -> Self {
        Self {
            rp_id: rp_id.into(),
            origins: HashSet::from([origin]),
            challenge,
            token_binding_id: None,
        }
    }

    #[must_use]
    pub fn with_origins(
        origins: impl IntoIterator<Item = Origin>,
        rp_id: impl Into<String>,
        challenge: Challenge,
    ) -> Self {
        Self {
            rp_id: rp_id.into(),
            origins: origins.into_iter().collect(),
            challenge,
            token_binding_id: None,
        }
    }
}

/// Registration ceremony expectations
#[derive(Debug, Clone)]
pub struct RegistrationParameters {
    pub server_property: ServerProperty,
    /// Allowed credential algorithms (`pubKeyCredParams`)
    pub pub_key_cred_params: Vec<CoseAlgorithm>,
    pub user_verification_required: bool,
    pub user_presence_required: bool,
    /// Extension identifiers requested in the creation options
    pub requested_extensions: Option<Vec<String>>,
}

impl RegistrationParameters {
    #[must_use]
    pub fn new(
        server_property: ServerProperty,
        pub_key_cred_params: Vec<CoseAlgorithm>,
        user_verification_required: bool,
    ) -> Self {
        Self {
            server_property,
            pub_key_cred_params,
            user_verification_required,
            user_presence_required: true,
            requested_extensions: None,
        }
    }
}

/// Credential state persisted by the caller after registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
    pub sign_count: u32,
    pub aaguid: Aaguid,
    pub attestation_type: AttestationType,
    pub backup_eligible: Option<bool>,
    pub backup_state: Option<bool>,
    pub uv_initialized: Option<bool>,
    pub transports: Vec<String>,
}

/// Authentication ceremony expectations
#[derive(Debug, Clone)]
pub struct AuthenticationParameters {
    pub server_property: ServerProperty,
    /// The stored credential resolved by the caller from the credential id
    pub credential_record: CredentialRecord,
    /// Credential ids offered in `allowCredentials`; `None` for discoverable flows
    pub allow_credentials: Option<Vec<Vec<u8>>>,
    pub user_verification_required: bool,
    pub user_presence_required: bool,
    pub requested_extensions: Option<Vec<String>>,
}

impl AuthenticationParameters {
    #[must_use]
    pub fn new(
        server_property: ServerProperty,
        credential_record: CredentialRecord,
        user_verification_required: bool,
    ) -> Self {
        Self {
            server_property,
            credential_record,
            allow_credentials: None,
            user_verification_required,
            user_presence_required: true,
            requested_extensions: None,
        }
    }
}

/// Raw registration response bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub client_extensions_json: Option<String>,
    pub transports: Vec<String>,
}

/// Raw authentication response bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub credential_id: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub client_extensions_json: Option<String>,
    pub signature: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialJson<R> {
    #[serde(default)]
    raw_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    response: R,
    #[serde(default)]
    client_extension_results: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttestationResponseJson {
    attestation_object: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    #[serde(default)]
    transports: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssertionResponseJson {
    authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    client_data_json: String,
    signature: String,
    #[serde(default)]
    user_handle: Option<String>,
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, VerificationError> {
    base64url::decode(value)
        .map_err(|e| VerificationError::DataConversion(format!("{name} is not base64url: {e}")))
}

impl RegistrationRequest {
    /// Build a request from a `PublicKeyCredential` JSON serialization
    ///
    /// # Errors
    /// Returns `DataConversion` for invalid JSON or base64url fields.
    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        let credential: CredentialJson<AttestationResponseJson> = serde_json::from_str(json)?;
        Ok(Self {
            attestation_object: decode_field(
                "attestationObject",
                &credential.response.attestation_object,
            )?,
            client_data_json: decode_field("clientDataJSON", &credential.response.client_data_json)?,
            client_extensions_json: credential
                .client_extension_results
                .map(|value| value.to_string()),
            transports: credential.response.transports,
        })
    }
}

impl AuthenticationRequest {
    /// Build a request from a `PublicKeyCredential` JSON serialization
    ///
    /// # Errors
    /// Returns `DataConversion` for invalid JSON or base64url fields, or when
    /// the credential id is missing.
    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        let credential: CredentialJson<AssertionResponseJson> = serde_json::from_str(json)?;
        let id = credential
            .raw_id
            .or(credential.id)
            .ok_or_else(|| VerificationError::DataConversion("missing credential id".into()))?;
        let response = credential.response;

        Ok(Self {
            credential_id: decode_field("rawId", &id)?,
            user_handle: response
                .user_handle
                .filter(|handle| !handle.is_empty())
                .map(|handle| decode_field("userHandle", &handle))
                .transpose()?,
            authenticator_data: decode_field("authenticatorData", &response.authenticator_data)?,
            client_data_json: decode_field("clientDataJSON", &response.client_data_json)?,
            client_extensions_json: credential
                .client_extension_results
                .map(|value| value.to_string()),
            signature: decode_field("signature", &response.signature)?,
        })
    }
}

/// Parsed registration response
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationData {
    pub attestation_object: AttestationObject,
    pub attestation_object_bytes: Vec<u8>,
    pub client_data: ClientData,
    pub client_data_bytes: Vec<u8>,
    pub client_extensions: ClientExtensionOutputs,
    pub transports: Vec<String>,
}

/// Parsed authentication response
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationData {
    pub credential_id: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub authenticator_data: AuthenticatorData,
    pub authenticator_data_bytes: Vec<u8>,
    pub client_data: ClientData,
    pub client_data_bytes: Vec<u8>,
    pub client_extensions: ClientExtensionOutputs,
    pub signature: Vec<u8>,
}

/// A registration that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedRegistration {
    pub data: RegistrationData,
    pub attestation_type: AttestationType,
}

impl VerifiedRegistration {
    /// The credential record to persist for later authentication
    ///
    /// # Errors
    /// Returns `ConstraintViolation` if the attested credential data is
    /// missing, which a verified registration never has.
    pub fn credential_record(&self) -> Result<CredentialRecord, VerificationError> {
        let authenticator_data = &self.data.attestation_object.authenticator_data;
        let attested = authenticator_data
            .attested_credential_data
            .as_ref()
            .ok_or_else(|| {
                VerificationError::ConstraintViolation("attested credential data missing".into())
            })?;

        Ok(CredentialRecord {
            credential_id: attested.credential_id.clone(),
            public_key: attested.credential_public_key.clone(),
            sign_count: authenticator_data.sign_count,
            aaguid: attested.aaguid,
            attestation_type: self.attestation_type,
            backup_eligible: Some(authenticator_data.flags.backup_eligible()),
            backup_state: Some(authenticator_data.flags.backup_state()),
            uv_initialized: Some(authenticator_data.flags.user_verified()),
            transports: self.data.transports.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_request_from_json() {
        let json = r#"{
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "attestationObject": "o2NmbXRkbm9uZQ",
                "clientDataJSON": "e30",
                "transports": ["usb", "nfc"]
            },
            "clientExtensionResults": {"credProps": {"rk": true}}
        }"#;
        let request = RegistrationRequest::from_json(json).unwrap();
        assert_eq!(request.client_data_json, b"{}");
        assert_eq!(request.transports, vec!["usb", "nfc"]);
        assert!(request
            .client_extensions_json
            .unwrap()
            .contains("credProps"));
    }

    #[test]
    fn test_authentication_request_from_json() {
        let json = r#"{
            "rawId": "AQID",
            "response": {
                "authenticatorData": "AAAA",
                "clientDataJSON": "e30",
                "signature": "BAUG",
                "userHandle": ""
            }
        }"#;
        let request = AuthenticationRequest::from_json(json).unwrap();
        assert_eq!(request.credential_id, vec![1, 2, 3]);
        assert_eq!(request.signature, vec![4, 5, 6]);
        assert!(request.user_handle.is_none());
    }

    #[test]
    fn test_request_rejects_bad_base64() {
        let json = r#"{"rawId": "!!", "response": {"authenticatorData": "AAAA",
            "clientDataJSON": "e30", "signature": "AA"}}"#;
        assert!(matches!(
            AuthenticationRequest::from_json(json),
            Err(VerificationError::DataConversion(_))
        ));
    }
}
