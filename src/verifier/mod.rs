//! Ceremony verification
//!
//! Atomic checks, attestation statement verifiers, trust assessment and the
//! two fail-fast pipelines built on top of them.

pub mod attestation;
pub mod attestation_verifier;
pub mod authentication;
pub mod checks;
pub mod custom;
pub mod registration;
pub mod trust;

use chrono::{DateTime, Utc};

use crate::crypto::sha256;
use crate::data::{
    AttestationObject, AttestedCredentialData, AuthenticationData, AuthenticationParameters,
    AuthenticatorData, Origin, RegistrationData, RegistrationParameters, ServerProperty,
};
use crate::error::VerificationError;

pub use attestation::{AttestationOutcome, AttestationStatementVerifiers};
pub use attestation_verifier::{AsyncAttestationVerifier, AttestationVerifier};
pub use authentication::{
    AsyncAuthenticationVerifier, AuthenticationPolicy, AuthenticationVerifier, MaliciousCounterPolicy,
};
pub use checks::{ExtensionPolicy, DEFAULT_MAX_CREDENTIAL_ID_LENGTH};
pub use custom::{
    AsyncCustomAuthenticationVerifier, AsyncCustomRegistrationVerifier,
    CustomAuthenticationVerifier, CustomRegistrationVerifier,
};
pub use registration::{AsyncRegistrationVerifier, RegistrationPolicy, RegistrationVerifier};
pub use trust::{
    AcceptSelfAttestation, AsyncTrustAnchorRepository, CertPathVerifier, RejectSelfAttestation,
    SelfAttestationPolicy, StaticTrustAnchorRepository, TrustAnchor, TrustAnchorRepository,
};

/// Decides whether a client origin is trusted for a ceremony
pub trait OriginPolicy: Send + Sync {
    fn is_trusted(&self, origin: &Origin, server_property: &ServerProperty) -> bool;
}

/// Default origin policy: membership in `ServerProperty::origins`
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerPropertyOrigins;

impl OriginPolicy for ServerPropertyOrigins {
    fn is_trusted(&self, origin: &Origin, server_property: &ServerProperty) -> bool {
        server_property.origins.contains(origin)
    }
}

impl<F> OriginPolicy for F
where
    F: Fn(&Origin, &ServerProperty) -> bool + Send + Sync,
{
    fn is_trusted(&self, origin: &Origin, server_property: &ServerProperty) -> bool {
        self(origin, server_property)
    }
}

/// Everything a registration check can look at
#[derive(Debug, Clone, Copy)]
pub struct RegistrationObject<'a> {
    pub data: &'a RegistrationData,
    pub parameters: &'a RegistrationParameters,
    /// SHA-256 of the exact `clientDataJSON` bytes
    pub client_data_hash: [u8; 32],
    /// Reference time for certificate validity
    pub timestamp: DateTime<Utc>,
}

impl<'a> RegistrationObject<'a> {
    #[must_use]
    pub fn new(data: &'a RegistrationData, parameters: &'a RegistrationParameters) -> Self {
        Self::at(data, parameters, Utc::now())
    }

    #[must_use]
    pub fn at(
        data: &'a RegistrationData,
        parameters: &'a RegistrationParameters,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            parameters,
            client_data_hash: sha256(&data.client_data_bytes),
            timestamp,
        }
    }

    #[must_use]
    pub fn attestation_object(&self) -> &'a AttestationObject {
        &self.data.attestation_object
    }

    #[must_use]
    pub fn authenticator_data(&self) -> &'a AuthenticatorData {
        &self.data.attestation_object.authenticator_data
    }

    /// `authData` bytes as signed by the authenticator
    #[must_use]
    pub fn authenticator_data_bytes(&self) -> &'a [u8] {
        &self.data.attestation_object.authenticator_data_bytes
    }

    /// # Errors
    /// `ConstraintViolation` when the authenticator data has no attested
    /// credential data.
    pub fn attested_credential_data(&self) -> Result<&'a AttestedCredentialData, VerificationError> {
        self.authenticator_data()
            .attested_credential_data
            .as_ref()
            .ok_or_else(|| {
                VerificationError::ConstraintViolation(
                    "attested credential data is required for registration".into(),
                )
            })
    }
}

/// Everything an authentication check can look at
#[derive(Debug, Clone, Copy)]
pub struct AuthenticationObject<'a> {
    pub data: &'a AuthenticationData,
    pub parameters: &'a AuthenticationParameters,
    pub client_data_hash: [u8; 32],
}

impl<'a> AuthenticationObject<'a> {
    #[must_use]
    pub fn new(data: &'a AuthenticationData, parameters: &'a AuthenticationParameters) -> Self {
        Self {
            data,
            parameters,
            client_data_hash: sha256(&data.client_data_bytes),
        }
    }
}
