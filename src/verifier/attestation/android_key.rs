//! `android-key` format: Android Keystore key attestation

use crate::asn1::{self, DerReader, Tlv, CLASS_CONTEXT, TAG_ENUMERATED, TAG_INTEGER, TAG_OCTET_STRING, TAG_SEQUENCE};
use crate::crypto::signature::{same_public_key, verify_with_pkey};
use crate::crypto::signed_data;
use crate::crypto::x509::{extension_value, parse_chain};
use crate::data::{AndroidKeyStatement, AttestationType};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, leaf, AndroidKeyOptions, AttestationOutcome};
use crate::verifier::RegistrationObject;

/// Android key attestation extension
pub const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

const TAG_PURPOSE: u32 = 1;
const TAG_ALL_APPLICATIONS: u32 = 600;
const TAG_ORIGIN: u32 = 702;

const KM_ORIGIN_GENERATED: u64 = 0;
const KM_PURPOSE_SIGN: u64 = 2;

/// The parts of a keymaster `AuthorizationList` that attestation cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    pub purposes: Vec<u64>,
    pub origin: Option<u64>,
    pub all_applications: bool,
}

impl AuthorizationList {
    fn parse(tlv: &Tlv<'_>) -> Result<Self, String> {
        let mut list = Self::default();
        let mut fields = tlv.children();
        while !fields.is_empty() {
            let field = fields.read()?;
            if field.class != CLASS_CONTEXT {
                continue;
            }
            match field.tag {
                TAG_PURPOSE => {
                    let set = asn1::parse_single(field.value)?;
                    let mut values = set.children();
                    while !values.is_empty() {
                        list.purposes.push(values.expect(TAG_INTEGER)?.as_u64()?);
                    }
                }
                TAG_ORIGIN => {
                    list.origin = Some(asn1::parse_single(field.value)?.as_u64()?);
                }
                TAG_ALL_APPLICATIONS => list.all_applications = true,
                _ => {}
            }
        }
        Ok(list)
    }
}

/// `KeyDescription` from the attestation extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub attestation_challenge: Vec<u8>,
    pub software_enforced: AuthorizationList,
    pub tee_enforced: AuthorizationList,
}

impl KeyDescription {
    /// # Errors
    /// Returns a message if the DER does not follow the `KeyDescription` layout.
    pub fn parse(der: &[u8]) -> Result<Self, String> {
        let sequence = asn1::parse_single(der)?;
        if !sequence.is(asn1::CLASS_UNIVERSAL, TAG_SEQUENCE) {
            return Err("KeyDescription must be a SEQUENCE".into());
        }
        let mut reader: DerReader<'_> = sequence.children();
        reader.expect(TAG_INTEGER)?; // attestationVersion
        reader.expect(TAG_ENUMERATED)?; // attestationSecurityLevel
        reader.expect(TAG_INTEGER)?; // keymasterVersion
        reader.expect(TAG_ENUMERATED)?; // keymasterSecurityLevel
        let attestation_challenge = reader.expect(TAG_OCTET_STRING)?.value.to_vec();
        reader.expect(TAG_OCTET_STRING)?; // uniqueId
        let software_enforced = AuthorizationList::parse(&reader.expect(TAG_SEQUENCE)?)?;
        let tee_enforced = AuthorizationList::parse(&reader.expect(TAG_SEQUENCE)?)?;

        Ok(Self {
            attestation_challenge,
            software_enforced,
            tee_enforced,
        })
    }
}

/// # Errors
/// `BadAttestationStatement` for a bad signature, a certificate key that is
/// not the credential key, or key description requirements that fail.
pub fn verify(
    statement: &AndroidKeyStatement,
    object: &RegistrationObject<'_>,
    options: AndroidKeyOptions,
) -> Result<AttestationOutcome, VerificationError> {
    let attested = object.attested_credential_data()?;
    let chain = parse_chain(&statement.x5c)?;
    let certificate_key = leaf(&chain)?.public_key()?;

    let signed = signed_data(object.authenticator_data_bytes(), &object.client_data_hash);
    verify_with_pkey(&certificate_key, statement.alg, &signed, &statement.sig)?;

    if !same_public_key(&attested.credential_public_key, &certificate_key)? {
        return Err(bad_statement(
            "attestation certificate key does not match the credential public key",
        ));
    }

    let extension = extension_value(&statement.x5c[0], OID_ANDROID_KEY_DESCRIPTION)?
        .ok_or_else(|| bad_statement("attestation certificate lacks the key description extension"))?;
    let description = KeyDescription::parse(&extension).map_err(bad_statement)?;

    if description.attestation_challenge != object.client_data_hash {
        return Err(bad_statement("attestationChallenge is not the client data hash"));
    }
    if description.software_enforced.all_applications || description.tee_enforced.all_applications {
        return Err(bad_statement("key must be scoped to the relying party (allApplications present)"));
    }

    let mut lists = vec![&description.tee_enforced];
    if !options.tee_enforced_only {
        lists.push(&description.software_enforced);
    }
    if !lists.iter().any(|list| list.origin == Some(KM_ORIGIN_GENERATED)) {
        return Err(bad_statement("key origin must be KM_ORIGIN_GENERATED"));
    }
    if !lists.iter().any(|list| list.purposes.contains(&KM_PURPOSE_SIGN)) {
        return Err(bad_statement("key purpose must include KM_PURPOSE_SIGN"));
    }

    Ok(AttestationOutcome::new(AttestationType::Basic, statement.x5c.clone()))
}
