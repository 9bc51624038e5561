//! `tpm` format: TPM 2.0 `certInfo` / `pubArea` attestation
//!
//! The AIK certificate signs a `TPMS_ATTEST` structure that names the
//! credential key (`pubArea`) and carries a hash of the signed data in
//! `extraData`.

use openssl::hash::{hash, MessageDigest};

use crate::crypto::signature::verify_with_pkey;
use crate::crypto::signed_data;
use crate::crypto::x509::{parse_chain, CertificateProfile};
use crate::data::{AttestationType, CoseAlgorithm, CoseCurve, CoseKey, CoseKeyParams, TpmStatement};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, check_aaguid_extension, leaf, AttestationOutcome};
use crate::verifier::RegistrationObject;

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000b;
pub const TPM_ALG_SHA384: u16 = 0x000c;
pub const TPM_ALG_SHA512: u16 = 0x000d;
pub const TPM_ALG_ECC: u16 = 0x0023;

pub const TPM_ECC_NIST_P256: u16 = 0x0003;
pub const TPM_ECC_NIST_P384: u16 = 0x0004;
pub const TPM_ECC_NIST_P521: u16 = 0x0005;

/// tcg-kp-AIKCertificate
pub const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// Big-endian cursor over TPM marshalled structures
struct TpmReader<'a> {
    data: &'a [u8],
}

impl<'a> TpmReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], VerificationError> {
        if self.data.len() < len {
            return Err(bad_statement(format!("TPM structure truncated reading {what}")));
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u16(&mut self, what: &str) -> Result<u16, VerificationError> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32, VerificationError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// `TPM2B_*`: u16 size followed by that many bytes
    fn sized(&mut self, what: &str) -> Result<&'a [u8], VerificationError> {
        let len = self.u16(what)?;
        self.take(usize::from(len), what)
    }

    fn finish(&self, what: &str) -> Result<(), VerificationError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(bad_statement(format!("trailing bytes after {what}")))
        }
    }
}

/// Public key parameters from `TPMT_PUBLIC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmPublicKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc { curve: u16, x: Vec<u8>, y: Vec<u8> },
}

/// `TPMT_PUBLIC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubArea {
    pub name_alg: u16,
    pub object_attributes: u32,
    pub key: TpmPublicKey,
}

impl PubArea {
    /// # Errors
    /// `BadAttestationStatement` on malformed or unsupported structures.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        let mut reader = TpmReader::new(bytes);
        let key_type = reader.u16("type")?;
        let name_alg = reader.u16("nameAlg")?;
        let object_attributes = reader.u32("objectAttributes")?;
        reader.sized("authPolicy")?;

        let key = match key_type {
            TPM_ALG_RSA => {
                reader.u16("symmetric")?;
                reader.u16("scheme")?;
                reader.u16("keyBits")?;
                let exponent = match reader.u32("exponent")? {
                    0 => 65_537,
                    exponent => exponent,
                };
                let modulus = reader.sized("unique")?.to_vec();
                TpmPublicKey::Rsa { modulus, exponent }
            }
            TPM_ALG_ECC => {
                reader.u16("symmetric")?;
                reader.u16("scheme")?;
                let curve = reader.u16("curveID")?;
                reader.u16("kdf")?;
                let x = reader.sized("unique.x")?.to_vec();
                let y = reader.sized("unique.y")?.to_vec();
                TpmPublicKey::Ecc { curve, x, y }
            }
            other => return Err(bad_statement(format!("unsupported pubArea type {other:#06x}"))),
        };
        reader.finish("pubArea")?;

        Ok(Self {
            name_alg,
            object_attributes,
            key,
        })
    }

    fn matches(&self, key: &CoseKey) -> bool {
        match (&self.key, &key.params) {
            (TpmPublicKey::Rsa { modulus, exponent }, CoseKeyParams::Rsa { n, e }) => {
                modulus == n && u64::from(*exponent) == be_uint(e)
            }
            (TpmPublicKey::Ecc { curve, x: tx, y: ty }, CoseKeyParams::Ec2 { curve: c, x, y }) => {
                tpm_curve(*c) == Some(*curve) && tx == x && ty == y
            }
            _ => false,
        }
    }
}

/// `TPMS_ATTEST` for `TPM_ST_ATTEST_CERTIFY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub magic: u32,
    pub attest_type: u16,
    pub extra_data: Vec<u8>,
    pub attested_name: Vec<u8>,
    pub attested_qualified_name: Vec<u8>,
}

impl CertInfo {
    /// # Errors
    /// `BadAttestationStatement` on malformed structures.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        let mut reader = TpmReader::new(bytes);
        let magic = reader.u32("magic")?;
        let attest_type = reader.u16("type")?;
        reader.sized("qualifiedSigner")?;
        let extra_data = reader.sized("extraData")?.to_vec();
        // clock u64, resetCount u32, restartCount u32, safe u8
        reader.take(17, "clockInfo")?;
        reader.take(8, "firmwareVersion")?;
        let attested_name = reader.sized("attested.name")?.to_vec();
        let attested_qualified_name = reader.sized("attested.qualifiedName")?.to_vec();
        reader.finish("certInfo")?;

        Ok(Self {
            magic,
            attest_type,
            extra_data,
            attested_name,
            attested_qualified_name,
        })
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

fn tpm_curve(curve: CoseCurve) -> Option<u16> {
    match curve {
        CoseCurve::P256 => Some(TPM_ECC_NIST_P256),
        CoseCurve::P384 => Some(TPM_ECC_NIST_P384),
        CoseCurve::P521 => Some(TPM_ECC_NIST_P521),
        _ => None,
    }
}

fn name_digest(name_alg: u16) -> Result<MessageDigest, VerificationError> {
    match name_alg {
        TPM_ALG_SHA1 => Ok(MessageDigest::sha1()),
        TPM_ALG_SHA256 => Ok(MessageDigest::sha256()),
        TPM_ALG_SHA384 => Ok(MessageDigest::sha384()),
        TPM_ALG_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(bad_statement(format!("unsupported nameAlg {other:#06x}"))),
    }
}

fn statement_digest(alg: CoseAlgorithm) -> Result<MessageDigest, VerificationError> {
    match alg {
        CoseAlgorithm::Rs1 => Ok(MessageDigest::sha1()),
        CoseAlgorithm::Es256 | CoseAlgorithm::Rs256 | CoseAlgorithm::Ps256 => Ok(MessageDigest::sha256()),
        CoseAlgorithm::Es384 | CoseAlgorithm::Rs384 | CoseAlgorithm::Ps384 => Ok(MessageDigest::sha384()),
        CoseAlgorithm::Es512 | CoseAlgorithm::Rs512 | CoseAlgorithm::Ps512 => Ok(MessageDigest::sha512()),
        other => Err(bad_statement(format!("unsupported tpm alg {other}"))),
    }
}

/// # Errors
/// `BadAttestationStatement` when any TPM structure, signature or AIK
/// certificate requirement fails; `BadAaguid` for a mismatching AAGUID
/// extension.
pub fn verify(
    statement: &TpmStatement,
    object: &RegistrationObject<'_>,
) -> Result<AttestationOutcome, VerificationError> {
    if statement.ver != "2.0" {
        return Err(bad_statement(format!("unsupported TPM version '{}'", statement.ver)));
    }
    if statement.x5c.is_empty() {
        return Err(bad_statement("tpm attestation requires x5c; ECDAA is not supported"));
    }

    let attested = object.attested_credential_data()?;
    let pub_area = PubArea::parse(&statement.pub_area)?;
    if !pub_area.matches(&attested.credential_public_key) {
        return Err(bad_statement("pubArea key does not match the credential public key"));
    }

    let cert_info = CertInfo::parse(&statement.cert_info)?;
    if cert_info.magic != TPM_GENERATED_VALUE {
        return Err(bad_statement("certInfo magic is not TPM_GENERATED_VALUE"));
    }
    if cert_info.attest_type != TPM_ST_ATTEST_CERTIFY {
        return Err(bad_statement("certInfo type is not TPM_ST_ATTEST_CERTIFY"));
    }

    let att_to_be_signed = signed_data(object.authenticator_data_bytes(), &object.client_data_hash);
    let expected_extra = hash(statement_digest(statement.alg)?, &att_to_be_signed)?;
    if cert_info.extra_data != expected_extra.as_ref() {
        return Err(bad_statement("certInfo extraData does not hash the signed data"));
    }

    let pub_area_hash = hash(name_digest(pub_area.name_alg)?, &statement.pub_area)?;
    let mut expected_name = pub_area.name_alg.to_be_bytes().to_vec();
    expected_name.extend_from_slice(&pub_area_hash);
    if cert_info.attested_name != expected_name {
        return Err(bad_statement("certInfo name does not match pubArea"));
    }

    let chain = parse_chain(&statement.x5c)?;
    let aik_key = leaf(&chain)?.public_key()?;
    verify_with_pkey(&aik_key, statement.alg, &statement.cert_info, &statement.sig)?;

    check_aik_certificate(&statement.x5c[0])?;
    check_aaguid_extension(&statement.x5c[0], &attested.aaguid)?;

    Ok(AttestationOutcome::new(AttestationType::AttCa, statement.x5c.clone()))
}

fn check_aik_certificate(der: &[u8]) -> Result<(), VerificationError> {
    let profile = CertificateProfile::parse(der)?;
    if profile.version != 3 {
        return Err(bad_statement("AIK certificate must be X.509 v3"));
    }
    if !profile.subject_empty {
        return Err(bad_statement("AIK certificate subject must be empty"));
    }
    if !profile.has_subject_alt_name {
        return Err(bad_statement("AIK certificate needs a subject alternative name"));
    }
    if !profile
        .extended_key_usages
        .iter()
        .any(|oid| oid == OID_TCG_KP_AIK_CERTIFICATE)
    {
        return Err(bad_statement("AIK certificate lacks tcg-kp-AIKCertificate EKU"));
    }
    if profile.basic_constraints_ca == Some(true) {
        return Err(bad_statement("AIK certificate must not be a CA"));
    }
    Ok(())
}
