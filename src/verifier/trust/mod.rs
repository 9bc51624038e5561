//! Trustworthiness of attestation statements
//!
//! Trust anchors come from a [`TrustAnchorRepository`] (or its async twin)
//! keyed by AAGUID, or by attestation certificate key identifier for U2F
//! authenticators that report the zero AAGUID.

pub mod cert_path;
pub mod revocation;

use std::collections::HashMap;

use async_trait::async_trait;
use openssl::x509::X509;

use crate::data::Aaguid;
use crate::error::VerificationError;
use crate::verifier::RegistrationObject;

pub use cert_path::CertPathVerifier;

/// A certificate treated as trusted for chain validation
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub certificate: X509,
}

impl TrustAnchor {
    #[must_use]
    pub fn new(certificate: X509) -> Self {
        Self { certificate }
    }

    /// # Errors
    /// `DataConversion` when the bytes are neither DER nor PEM.
    pub fn from_der_or_pem(bytes: &[u8]) -> Result<Self, VerificationError> {
        X509::from_der(bytes)
            .or_else(|_| X509::from_pem(bytes))
            .map(Self::new)
            .map_err(|e| VerificationError::DataConversion(format!("invalid trust anchor: {e}")))
    }
}

/// Source of trust anchors for the certificate-path verifier
pub trait TrustAnchorRepository: Send + Sync {
    /// # Errors
    /// Implementations may fail when their backing store is unavailable.
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError>;

    /// Lookup by SHA-1 of the attestation certificate subject public key
    ///
    /// # Errors
    /// Implementations may fail when their backing store is unavailable.
    fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError>;
}

/// Trust anchor source that may need I/O, such as a metadata service
#[async_trait]
pub trait AsyncTrustAnchorRepository: Send + Sync {
    /// # Errors
    /// Implementations may fail when their backing store is unavailable.
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError>;

    /// # Errors
    /// Implementations may fail when their backing store is unavailable.
    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError>;
}

/// Fixed, in-memory trust anchors
#[derive(Debug, Clone, Default)]
pub struct StaticTrustAnchorRepository {
    by_aaguid: HashMap<Aaguid, Vec<TrustAnchor>>,
    by_key_identifier: HashMap<Vec<u8>, Vec<TrustAnchor>>,
    /// Returned for every lookup
    shared: Vec<TrustAnchor>,
}

impl StaticTrustAnchorRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_aaguid(mut self, aaguid: Aaguid, certificate: X509) -> Self {
        self.by_aaguid
            .entry(aaguid)
            .or_default()
            .push(TrustAnchor::new(certificate));
        self
    }

    #[must_use]
    pub fn with_key_identifier(mut self, key_identifier: Vec<u8>, certificate: X509) -> Self {
        self.by_key_identifier
            .entry(key_identifier)
            .or_default()
            .push(TrustAnchor::new(certificate));
        self
    }

    /// Anchor that applies to every authenticator
    #[must_use]
    pub fn with_anchor(mut self, certificate: X509) -> Self {
        self.shared.push(TrustAnchor::new(certificate));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_aaguid.is_empty() && self.by_key_identifier.is_empty() && self.shared.is_empty()
    }

    fn collect(&self, specific: Option<&Vec<TrustAnchor>>) -> Vec<TrustAnchor> {
        specific
            .into_iter()
            .flatten()
            .chain(self.shared.iter())
            .cloned()
            .collect()
    }
}

impl TrustAnchorRepository for StaticTrustAnchorRepository {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError> {
        Ok(self.collect(self.by_aaguid.get(aaguid)))
    }

    fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError> {
        Ok(self.collect(self.by_key_identifier.get(key_identifier)))
    }
}

#[async_trait]
impl AsyncTrustAnchorRepository for StaticTrustAnchorRepository {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError> {
        TrustAnchorRepository::find_by_aaguid(self, aaguid)
    }

    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError> {
        TrustAnchorRepository::find_by_key_identifier(self, key_identifier)
    }
}

/// Policy gate for self attestation
pub trait SelfAttestationPolicy: Send + Sync {
    /// # Errors
    /// Returns an error to refuse the self-attested credential.
    fn verify(&self, object: &RegistrationObject<'_>) -> Result<(), VerificationError>;
}

/// Accepts every self attestation
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptSelfAttestation;

impl SelfAttestationPolicy for AcceptSelfAttestation {
    fn verify(&self, _object: &RegistrationObject<'_>) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// Refuses every self attestation
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectSelfAttestation;

impl SelfAttestationPolicy for RejectSelfAttestation {
    fn verify(&self, object: &RegistrationObject<'_>) -> Result<(), VerificationError> {
        Err(VerificationError::SelfAttestationProhibited(format!(
            "'{}' self attestation is not accepted",
            object.attestation_object().format
        )))
    }
}
