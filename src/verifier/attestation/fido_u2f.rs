//! `fido-u2f` format: legacy U2F registration signature

use openssl::nid::Nid;

use crate::crypto::signature::verify_with_pkey;
use crate::crypto::x509::parse_chain;
use crate::data::{AttestationType, CoseAlgorithm, CoseCurve, CoseKeyParams, FidoU2fStatement};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, leaf, AttestationOutcome};
use crate::verifier::RegistrationObject;

/// # Errors
/// `BadAttestationStatement` if the chain is not a single P-256 certificate,
/// the credential key is not an uncompressed P-256 point or the signature is
/// invalid.
pub fn verify(
    statement: &FidoU2fStatement,
    object: &RegistrationObject<'_>,
) -> Result<AttestationOutcome, VerificationError> {
    if statement.x5c.len() != 1 {
        return Err(bad_statement(format!(
            "fido-u2f requires exactly one attestation certificate, got {}",
            statement.x5c.len()
        )));
    }
    let chain = parse_chain(&statement.x5c)?;
    let certificate_key = leaf(&chain)?.public_key()?;
    let on_p256 = certificate_key
        .ec_key()
        .ok()
        .and_then(|ec| ec.group().curve_name())
        == Some(Nid::X9_62_PRIME256V1);
    if !on_p256 {
        return Err(bad_statement(
            "fido-u2f attestation certificate key must be on P-256",
        ));
    }

    let attested = object.attested_credential_data()?;
    let public_key_u2f = match &attested.credential_public_key.params {
        CoseKeyParams::Ec2 {
            curve: CoseCurve::P256,
            ..
        } => attested
            .credential_public_key
            .uncompressed_point()
            .filter(|point| point.len() == 65)
            .ok_or_else(|| bad_statement("credential key coordinates must be 32 bytes"))?,
        _ => return Err(bad_statement("fido-u2f credential key must be EC2 P-256")),
    };

    let rp_id_hash = &object.authenticator_data().rp_id_hash;
    let mut verification_data = Vec::with_capacity(1 + 32 + 32 + attested.credential_id.len() + 65);
    verification_data.push(0x00);
    verification_data.extend_from_slice(rp_id_hash);
    verification_data.extend_from_slice(&object.client_data_hash);
    verification_data.extend_from_slice(&attested.credential_id);
    verification_data.extend_from_slice(&public_key_u2f);

    verify_with_pkey(
        &certificate_key,
        CoseAlgorithm::Es256,
        &verification_data,
        &statement.sig,
    )?;

    Ok(AttestationOutcome::new(AttestationType::Basic, statement.x5c.clone()))
}
