//! `apple` format: Apple anonymous attestation

use crate::asn1::{self, CLASS_CONTEXT, CLASS_UNIVERSAL, TAG_OCTET_STRING, TAG_SEQUENCE};
use crate::crypto::signature::same_public_key;
use crate::crypto::x509::{extension_value, parse_chain};
use crate::crypto::{sha256, signed_data};
use crate::data::{AppleStatement, AttestationType};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, leaf, AttestationOutcome};
use crate::verifier::RegistrationObject;

/// Apple anonymous attestation nonce extension
pub const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

/// `SEQUENCE { [1] EXPLICIT OCTET STRING nonce }`
///
/// # Errors
/// Returns a message if the extension value does not have that shape.
pub fn parse_nonce(der: &[u8]) -> Result<Vec<u8>, String> {
    let sequence = asn1::parse_single(der)?;
    if !sequence.is(CLASS_UNIVERSAL, TAG_SEQUENCE) {
        return Err("nonce extension must be a SEQUENCE".into());
    }
    let mut reader = sequence.children();
    let tagged = reader.read()?;
    if !tagged.is(CLASS_CONTEXT, 1) {
        return Err("nonce extension must hold a [1] element".into());
    }
    let nonce = asn1::parse_single(tagged.value)?;
    if !nonce.is(CLASS_UNIVERSAL, TAG_OCTET_STRING) {
        return Err("nonce must be an OCTET STRING".into());
    }
    Ok(nonce.value.to_vec())
}

/// # Errors
/// `BadAttestationStatement` for a missing or wrong nonce, or a certificate
/// key that is not the credential key.
pub fn verify(
    statement: &AppleStatement,
    object: &RegistrationObject<'_>,
) -> Result<AttestationOutcome, VerificationError> {
    let attested = object.attested_credential_data()?;
    let chain = parse_chain(&statement.x5c)?;
    let certificate_key = leaf(&chain)?.public_key()?;

    let expected = sha256(&signed_data(
        object.authenticator_data_bytes(),
        &object.client_data_hash,
    ));
    let extension = extension_value(&statement.x5c[0], OID_APPLE_NONCE)?
        .ok_or_else(|| bad_statement("credential certificate lacks the Apple nonce extension"))?;
    let nonce = parse_nonce(&extension).map_err(bad_statement)?;
    if nonce != expected {
        return Err(bad_statement("Apple nonce does not match the signed data"));
    }

    if !same_public_key(&attested.credential_public_key, &certificate_key)? {
        return Err(bad_statement(
            "credential certificate key does not match the credential public key",
        ));
    }

    Ok(AttestationOutcome::new(AttestationType::AnonCa, statement.x5c.clone()))
}
