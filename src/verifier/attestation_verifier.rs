//! Attestation trust assessment
//!
//! Classifies the statement, enforces the zero AAGUID rule for U2F, then
//! hands the result to the trust check matching its attestation type.

use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::crypto::hex;
use crate::crypto::x509::CertificateProfile;
use crate::data::{AttestationFormat, AttestationType};
use crate::error::VerificationError;
use crate::verifier::attestation::{AttestationOutcome, AttestationStatementVerifiers};
use crate::verifier::trust::{
    AcceptSelfAttestation, AsyncTrustAnchorRepository, CertPathVerifier, SelfAttestationPolicy,
    StaticTrustAnchorRepository, TrustAnchor, TrustAnchorRepository,
};
use crate::verifier::RegistrationObject;

/// How trust anchors are looked up for an attestation
#[derive(Debug, Clone, PartialEq, Eq)]
enum AnchorKey {
    Aaguid(Uuid),
    KeyIdentifier(Vec<u8>),
}

impl AnchorKey {
    fn describe(&self) -> String {
        match self {
            Self::Aaguid(aaguid) => format!("AAGUID {aaguid}"),
            Self::KeyIdentifier(key_identifier) => {
                format!("attestation key identifier {}", hex(key_identifier))
            }
        }
    }
}

/// FIDO-U2F authenticators have no AAGUID
fn check_u2f_aaguid(object: &RegistrationObject<'_>) -> Result<(), VerificationError> {
    if object.attestation_object().format != AttestationFormat::FidoU2f.identifier() {
        return Ok(());
    }
    let aaguid = object.attested_credential_data()?.aaguid;
    if aaguid.is_nil() {
        Ok(())
    } else {
        Err(VerificationError::BadAaguid {
            expected: Uuid::nil().to_string(),
            actual: aaguid.to_string(),
        })
    }
}

/// FIDO-U2F anchors are keyed by the leaf certificate key identifier,
/// every other format by AAGUID
fn anchor_key(
    object: &RegistrationObject<'_>,
    outcome: &AttestationOutcome,
) -> Result<AnchorKey, VerificationError> {
    let u2f = object.attestation_object().format == AttestationFormat::FidoU2f.identifier();
    match outcome.certificates.first() {
        Some(leaf) if u2f => Ok(AnchorKey::KeyIdentifier(
            CertificateProfile::parse(leaf)?.key_identifier,
        )),
        _ => Ok(AnchorKey::Aaguid(object.attested_credential_data()?.aaguid)),
    }
}

fn require_anchors(
    anchors: Vec<TrustAnchor>,
    key: &AnchorKey,
) -> Result<Vec<TrustAnchor>, VerificationError> {
    if anchors.is_empty() {
        debug!("❌ No trust anchor for {}", key.describe());
        Err(VerificationError::TrustAnchorNotFound(key.describe()))
    } else {
        Ok(anchors)
    }
}

fn certificate_backed(attestation_type: AttestationType) -> Result<bool, VerificationError> {
    match attestation_type {
        AttestationType::None | AttestationType::SelfAttestation => Ok(false),
        AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa => Ok(true),
        AttestationType::Ecdaa => Err(VerificationError::BadAttestationStatement(
            "ECDAA attestation is not supported".into(),
        )),
    }
}

/// Synchronous attestation verifier
#[derive(Clone)]
pub struct AttestationVerifier {
    statements: AttestationStatementVerifiers,
    self_attestation: Arc<dyn SelfAttestationPolicy>,
    cert_path: CertPathVerifier,
    trust_anchors: Arc<dyn TrustAnchorRepository>,
}

impl Default for AttestationVerifier {
    fn default() -> Self {
        Self::new(
            AttestationStatementVerifiers::default(),
            Arc::new(StaticTrustAnchorRepository::new()),
        )
    }
}

impl AttestationVerifier {
    #[must_use]
    pub fn new(
        statements: AttestationStatementVerifiers,
        trust_anchors: Arc<dyn TrustAnchorRepository>,
    ) -> Self {
        Self {
            statements,
            self_attestation: Arc::new(AcceptSelfAttestation),
            cert_path: CertPathVerifier::new(),
            trust_anchors,
        }
    }

    #[must_use]
    pub fn with_self_attestation_policy(mut self, policy: Arc<dyn SelfAttestationPolicy>) -> Self {
        self.self_attestation = policy;
        self
    }

    #[must_use]
    pub fn with_cert_path_verifier(mut self, cert_path: CertPathVerifier) -> Self {
        self.cert_path = cert_path;
        self
    }

    #[must_use]
    pub fn statements(&self) -> &AttestationStatementVerifiers {
        &self.statements
    }

    fn find_anchors(&self, key: &AnchorKey) -> Result<Vec<TrustAnchor>, VerificationError> {
        let anchors = match key {
            AnchorKey::Aaguid(aaguid) => self.trust_anchors.find_by_aaguid(aaguid)?,
            AnchorKey::KeyIdentifier(id) => self.trust_anchors.find_by_key_identifier(id)?,
        };
        require_anchors(anchors, key)
    }

    /// # Errors
    /// Any statement, AAGUID, self attestation or certificate path failure.
    pub fn verify(&self, object: &RegistrationObject<'_>) -> Result<AttestationType, VerificationError> {
        let outcome = self.statements.verify(object)?;
        check_u2f_aaguid(object)?;

        if certificate_backed(outcome.attestation_type)? {
            let key = anchor_key(object, &outcome)?;
            let anchors = self.find_anchors(&key)?;
            self.cert_path
                .verify(&outcome.certificates, &anchors, object.timestamp)?;
        } else if outcome.attestation_type == AttestationType::SelfAttestation {
            self.self_attestation.verify(object)?;
        }
        Ok(outcome.attestation_type)
    }
}

/// Attestation verifier whose anchor lookup and revocation check may suspend
#[derive(Clone)]
pub struct AsyncAttestationVerifier {
    statements: AttestationStatementVerifiers,
    self_attestation: Arc<dyn SelfAttestationPolicy>,
    cert_path: CertPathVerifier,
    trust_anchors: Arc<dyn AsyncTrustAnchorRepository>,
}

impl Default for AsyncAttestationVerifier {
    fn default() -> Self {
        Self::new(
            AttestationStatementVerifiers::default(),
            Arc::new(StaticTrustAnchorRepository::new()),
        )
    }
}

impl AsyncAttestationVerifier {
    #[must_use]
    pub fn new(
        statements: AttestationStatementVerifiers,
        trust_anchors: Arc<dyn AsyncTrustAnchorRepository>,
    ) -> Self {
        Self {
            statements,
            self_attestation: Arc::new(AcceptSelfAttestation),
            cert_path: CertPathVerifier::new(),
            trust_anchors,
        }
    }

    #[must_use]
    pub fn with_self_attestation_policy(mut self, policy: Arc<dyn SelfAttestationPolicy>) -> Self {
        self.self_attestation = policy;
        self
    }

    #[must_use]
    pub fn with_cert_path_verifier(mut self, cert_path: CertPathVerifier) -> Self {
        self.cert_path = cert_path;
        self
    }

    #[must_use]
    pub fn statements(&self) -> &AttestationStatementVerifiers {
        &self.statements
    }

    async fn find_anchors(&self, key: &AnchorKey) -> Result<Vec<TrustAnchor>, VerificationError> {
        let anchors = match key {
            AnchorKey::Aaguid(aaguid) => self.trust_anchors.find_by_aaguid(aaguid).await?,
            AnchorKey::KeyIdentifier(id) => self.trust_anchors.find_by_key_identifier(id).await?,
        };
        require_anchors(anchors, key)
    }

    /// # Errors
    /// Any statement, AAGUID, self attestation, metadata or certificate path
    /// failure.
    pub async fn verify(
        &self,
        object: &RegistrationObject<'_>,
    ) -> Result<AttestationType, VerificationError> {
        let outcome = self.statements.verify(object)?;
        check_u2f_aaguid(object)?;

        if certificate_backed(outcome.attestation_type)? {
            let key = anchor_key(object, &outcome)?;
            let anchors = self.find_anchors(&key).await?;
            self.cert_path
                .verify_async(&outcome.certificates, &anchors, object.timestamp)
                .await?;
        } else if outcome.attestation_type == AttestationType::SelfAttestation {
            self.self_attestation.verify(object)?;
        }
        Ok(outcome.attestation_type)
    }
}
