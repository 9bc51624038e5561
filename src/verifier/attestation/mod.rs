//! Attestation statement verifiers
//!
//! One module per statement format. [`AttestationStatementVerifiers`] holds
//! the formats in dispatch order; the first entry whose identifier equals the
//! object's `fmt` handles it.

pub mod android_key;
pub mod android_safetynet;
pub mod apple;
pub mod fido_u2f;
pub mod none;
pub mod packed;
pub mod tpm;

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, warn};
use openssl::x509::X509;
use uuid::Uuid;

use crate::asn1::{self, CLASS_UNIVERSAL, TAG_OCTET_STRING};
use crate::crypto::x509::{extension_value, OID_FIDO_GEN_CE_AAGUID};
use crate::data::{Aaguid, AttestationFormat, AttestationStatement, AttestationType};
use crate::error::VerificationError;
use crate::verifier::RegistrationObject;

/// What a statement verifier established
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationOutcome {
    pub attestation_type: AttestationType,
    /// Attestation certificate chain (DER, leaf first) for trust assessment
    pub certificates: Vec<Vec<u8>>,
}

impl AttestationOutcome {
    #[must_use]
    pub fn new(attestation_type: AttestationType, certificates: Vec<Vec<u8>>) -> Self {
        Self {
            attestation_type,
            certificates,
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::new(AttestationType::None, Vec::new())
    }
}

/// Options for the android-key format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AndroidKeyOptions {
    /// Only accept authorizations from the TEE-enforced list
    pub tee_enforced_only: bool,
}

/// Acceptance window for the SafetyNet response timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyNetOptions {
    pub max_age: Duration,
    pub forward_tolerance: Duration,
}

impl Default for SafetyNetOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            forward_tolerance: Duration::from_secs(60),
        }
    }
}

/// Ordered list of statement formats, dispatched first-match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationStatementVerifiers {
    order: Vec<AttestationFormat>,
    android_key: AndroidKeyOptions,
    safetynet: SafetyNetOptions,
}

impl Default for AttestationStatementVerifiers {
    fn default() -> Self {
        Self::new(AttestationFormat::ALL.to_vec())
    }
}

impl AttestationStatementVerifiers {
    /// Duplicate formats are allowed but only the first one is ever reached
    #[must_use]
    pub fn new(order: Vec<AttestationFormat>) -> Self {
        let mut seen = HashSet::new();
        for format in &order {
            if !seen.insert(*format) {
                warn!("⚠️ Attestation format '{format}' registered more than once; later entries are unreachable");
            }
        }
        Self {
            order,
            android_key: AndroidKeyOptions::default(),
            safetynet: SafetyNetOptions::default(),
        }
    }

    #[must_use]
    pub fn with_android_key_options(mut self, options: AndroidKeyOptions) -> Self {
        self.android_key = options;
        self
    }

    #[must_use]
    pub fn with_safetynet_options(mut self, options: SafetyNetOptions) -> Self {
        self.safetynet = options;
        self
    }

    #[must_use]
    pub fn formats(&self) -> &[AttestationFormat] {
        &self.order
    }

    /// Whether some registered verifier claims the object's format
    #[must_use]
    pub fn supports(&self, object: &RegistrationObject<'_>) -> bool {
        self.select(object).is_some()
    }

    fn select(&self, object: &RegistrationObject<'_>) -> Option<AttestationFormat> {
        let format = object.attestation_object().format.as_str();
        self.order
            .iter()
            .copied()
            .find(|candidate| candidate.identifier() == format)
    }

    /// Verify the statement with the first verifier supporting its format
    ///
    /// # Errors
    /// `BadAttestationStatement` when no verifier supports the format or the
    /// statement is invalid for it.
    pub fn verify(&self, object: &RegistrationObject<'_>) -> Result<AttestationOutcome, VerificationError> {
        let Some(format) = self.select(object) else {
            let fmt = &object.attestation_object().format;
            debug!("❌ No attestation statement verifier supports format '{fmt}'");
            return Err(VerificationError::BadAttestationStatement(format!(
                "unsupported attestation format '{fmt}'"
            )));
        };

        let statement = &object.attestation_object().statement;
        let outcome = match (format, statement) {
            (AttestationFormat::None, AttestationStatement::None) => none::verify(object),
            (AttestationFormat::Packed, AttestationStatement::Packed(stmt)) => {
                packed::verify(stmt, object)
            }
            (AttestationFormat::FidoU2f, AttestationStatement::FidoU2f(stmt)) => {
                fido_u2f::verify(stmt, object)
            }
            (AttestationFormat::Tpm, AttestationStatement::Tpm(stmt)) => tpm::verify(stmt, object),
            (AttestationFormat::AndroidKey, AttestationStatement::AndroidKey(stmt)) => {
                android_key::verify(stmt, object, self.android_key)
            }
            (AttestationFormat::AndroidSafetyNet, AttestationStatement::AndroidSafetyNet(stmt)) => {
                android_safetynet::verify(stmt, object, self.safetynet)
            }
            (AttestationFormat::Apple, AttestationStatement::Apple(stmt)) => {
                apple::verify(stmt, object)
            }
            (format, _) => Err(bad_statement(format!(
                "statement does not match the '{format}' format"
            ))),
        }
        .map_err(into_statement_error)?;

        debug!(
            "✅ '{format}' attestation statement verified as {:?}",
            outcome.attestation_type
        );
        Ok(outcome)
    }
}

pub(crate) fn bad_statement(message: impl Into<String>) -> VerificationError {
    VerificationError::BadAttestationStatement(message.into())
}

/// Signature failures inside a statement are statement failures
fn into_statement_error(error: VerificationError) -> VerificationError {
    match error {
        VerificationError::BadSignature(message) => VerificationError::BadAttestationStatement(
            format!("attestation signature invalid: {message}"),
        ),
        other => other,
    }
}

pub(crate) fn leaf(chain: &[X509]) -> Result<&X509, VerificationError> {
    chain
        .first()
        .ok_or_else(|| bad_statement("certificate chain is empty"))
}

/// The id-fido-gen-ce-aaguid extension, when present, must equal the AAGUID
pub(crate) fn check_aaguid_extension(
    certificate: &[u8],
    aaguid: &Aaguid,
) -> Result<(), VerificationError> {
    let Some(value) = extension_value(certificate, OID_FIDO_GEN_CE_AAGUID)? else {
        return Ok(());
    };
    let tlv = asn1::parse_single(&value).map_err(bad_statement)?;
    if !tlv.is(CLASS_UNIVERSAL, TAG_OCTET_STRING) {
        return Err(bad_statement("AAGUID extension is not an OCTET STRING"));
    }
    let found = Uuid::from_slice(tlv.value)
        .map_err(|_| bad_statement("AAGUID extension must hold 16 bytes"))?;
    if &found == aaguid {
        Ok(())
    } else {
        Err(VerificationError::BadAaguid {
            expected: aaguid.to_string(),
            actual: found.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_covers_every_format() {
        let verifiers = AttestationStatementVerifiers::default();
        assert_eq!(verifiers.formats().len(), AttestationFormat::ALL.len());
        assert_eq!(verifiers.formats().last(), Some(&AttestationFormat::None));
    }

    #[test]
    fn test_signature_errors_become_statement_errors() {
        let error = into_statement_error(VerificationError::BadSignature("nope".into()));
        assert!(matches!(error, VerificationError::BadAttestationStatement(_)));

        let untouched = into_statement_error(VerificationError::UserNotPresent);
        assert_eq!(untouched, VerificationError::UserNotPresent);
    }
}
