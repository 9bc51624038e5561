//! `packed` format: basic attestation with `x5c`, otherwise self attestation

use crate::crypto::signature::{verify_cose_signature, verify_with_pkey};
use crate::crypto::signed_data;
use crate::crypto::x509::{parse_chain, CertificateProfile};
use crate::data::{AttestationType, PackedStatement};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, check_aaguid_extension, leaf, AttestationOutcome};
use crate::verifier::RegistrationObject;

const ATTESTATION_OU: &str = "Authenticator Attestation";

/// # Errors
/// `BadAttestationStatement` for ECDAA, bad signatures or a certificate that
/// does not meet the packed profile; `BadAaguid` for a mismatching AAGUID
/// extension.
pub fn verify(
    statement: &PackedStatement,
    object: &RegistrationObject<'_>,
) -> Result<AttestationOutcome, VerificationError> {
    if statement.ecdaa_key_id.is_some() {
        return Err(bad_statement("ECDAA attestation is not supported"));
    }

    let attested = object.attested_credential_data()?;
    let signed = signed_data(object.authenticator_data_bytes(), &object.client_data_hash);

    if statement.x5c.is_empty() {
        let key = &attested.credential_public_key;
        if key.algorithm != Some(statement.alg) {
            return Err(bad_statement(format!(
                "self attestation alg {} does not match the credential key algorithm",
                statement.alg
            )));
        }
        verify_cose_signature(key, statement.alg, &signed, &statement.sig)?;
        return Ok(AttestationOutcome::new(AttestationType::SelfAttestation, Vec::new()));
    }

    let chain = parse_chain(&statement.x5c)?;
    let public_key = leaf(&chain)?.public_key()?;
    verify_with_pkey(&public_key, statement.alg, &signed, &statement.sig)?;

    check_certificate(&statement.x5c[0])?;
    check_aaguid_extension(&statement.x5c[0], &attested.aaguid)?;

    Ok(AttestationOutcome::new(AttestationType::Basic, statement.x5c.clone()))
}

fn check_certificate(der: &[u8]) -> Result<(), VerificationError> {
    let profile = CertificateProfile::parse(der)?;
    if profile.version != 3 {
        return Err(bad_statement("attestation certificate must be X.509 v3"));
    }
    if profile.country.is_none() || profile.organization.is_none() || profile.common_name.is_none() {
        return Err(bad_statement(
            "attestation certificate subject needs C, O and CN",
        ));
    }
    if profile.organizational_unit.as_deref() != Some(ATTESTATION_OU) {
        return Err(bad_statement(format!(
            "attestation certificate OU must be '{ATTESTATION_OU}'"
        )));
    }
    if profile.basic_constraints_ca == Some(true) {
        return Err(bad_statement("attestation certificate must not be a CA"));
    }
    Ok(())
}
