//! `none` format: no attestation, nothing to check

use crate::error::VerificationError;
use crate::verifier::attestation::AttestationOutcome;
use crate::verifier::RegistrationObject;

/// # Errors
/// Never fails; the signature matches the other format verifiers.
pub fn verify(_object: &RegistrationObject<'_>) -> Result<AttestationOutcome, VerificationError> {
    Ok(AttestationOutcome::none())
}
