//! X.509 certificate helpers
//!
//! `openssl` owns parsing for signature checks and chain building;
//! `x509-parser` is used to read profile fields and raw extension values.

use openssl::x509::X509;
use x509_parser::extensions::GeneralName;
use x509_parser::certificate::X509Certificate;
use x509_parser::x509::AttributeTypeAndValue;

use crate::error::VerificationError;

/// FIDO AAGUID extension (id-fido-gen-ce-aaguid)
pub const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";

/// Parse a DER certificate chain, leaf first
///
/// # Errors
/// Returns `BadAttestationStatement` if any certificate is malformed or the
/// chain is empty.
pub fn parse_chain(chain: &[Vec<u8>]) -> Result<Vec<X509>, VerificationError> {
    if chain.is_empty() {
        return Err(VerificationError::BadAttestationStatement(
            "certificate chain is empty".into(),
        ));
    }
    chain
        .iter()
        .map(|der| {
            X509::from_der(der).map_err(|e| {
                VerificationError::BadAttestationStatement(format!("invalid certificate: {e}"))
            })
        })
        .collect()
}

/// Profile fields of a certificate needed by attestation format rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateProfile {
    /// X.509 version number (3 for v3 certificates)
    pub version: u32,
    pub subject_empty: bool,
    pub country: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub common_name: Option<String>,
    /// `Some(ca)` when a basicConstraints extension is present
    pub basic_constraints_ca: Option<bool>,
    pub has_subject_alt_name: bool,
    pub dns_names: Vec<String>,
    pub extended_key_usages: Vec<String>,
    /// SHA-1 of the subjectPublicKey bits, the FIDO "attestation certificate key identifier"
    pub key_identifier: Vec<u8>,
}

fn parse_x509(der: &[u8]) -> Result<X509Certificate<'_>, VerificationError> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| VerificationError::BadAttestationStatement(format!("invalid certificate: {e:?}")))
}

fn first_attribute<'a, 'b: 'a, I>(mut values: I) -> Option<String>
where
    I: Iterator<Item = &'a AttributeTypeAndValue<'b>>,
{
    values
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .map(ToString::to_string)
}

impl CertificateProfile {
    /// # Errors
    /// Returns `BadAttestationStatement` if the certificate cannot be parsed.
    pub fn parse(der: &[u8]) -> Result<Self, VerificationError> {
        let cert = parse_x509(der)?;
        let subject = cert.subject();

        let basic_constraints_ca = cert
            .basic_constraints()
            .ok()
            .flatten()
            .map(|ext| ext.value.ca);

        let san = cert.subject_alternative_name().ok().flatten();
        let has_subject_alt_name = san.is_some();
        let dns_names = san
            .map(|ext| {
                ext.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some((*dns).to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let extended_key_usages = cert
            .extended_key_usage()
            .ok()
            .flatten()
            .map(|ext| ext.value.other.iter().map(|oid| oid.to_id_string()).collect())
            .unwrap_or_default();

        let public_key_bits: &[u8] = &cert.public_key().subject_public_key.data;
        let subject_empty = subject.iter_attributes().next().is_none();

        Ok(Self {
            version: cert.version().0 + 1,
            subject_empty,
            country: first_attribute(subject.iter_country()),
            organization: first_attribute(subject.iter_organization()),
            organizational_unit: first_attribute(subject.iter_organizational_unit()),
            common_name: first_attribute(subject.iter_common_name()),
            basic_constraints_ca,
            has_subject_alt_name,
            dns_names,
            extended_key_usages,
            key_identifier: openssl::sha::sha1(public_key_bits).to_vec(),
        })
    }
}

/// Raw value (contents of the extnValue OCTET STRING) of an extension
///
/// # Errors
/// Returns `BadAttestationStatement` if the certificate cannot be parsed.
pub fn extension_value(der: &[u8], oid: &str) -> Result<Option<Vec<u8>>, VerificationError> {
    let cert = parse_x509(der)?;
    Ok(cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == oid)
        .map(|ext| ext.value.to_vec()))
}

/// CRL distribution point URIs of a certificate
#[must_use]
pub fn crl_distribution_uris(cert: &X509) -> Vec<String> {
    let Some(points) = cert.crl_distribution_points() else {
        return Vec::new();
    };
    points
        .iter()
        .filter_map(|point| point.distpoint())
        .filter_map(|name| name.fullname())
        .flat_map(|names| names.iter().filter_map(|name| name.uri().map(ToString::to_string)))
        .collect()
}

/// DER equality of two certificates
#[must_use]
pub fn same_certificate(a: &X509, b: &X509) -> bool {
    match (a.to_der(), b.to_der()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
