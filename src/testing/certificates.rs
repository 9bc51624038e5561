//! Throwaway certificate authorities and attestation certificates
//!
//! Every key is a fresh P-256 key. Certificates are valid from a day ago
//! for a year unless [`LeafOptions::valid_between`] says otherwise.

use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Integer, Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Crl, X509Extension, X509Name, X509NameBuilder, X509NameRef, X509};
use uuid::Uuid;

use crate::crypto::x509::OID_FIDO_GEN_CE_AAGUID;
use crate::testing::der;
use crate::verifier::attestation::android_key::OID_ANDROID_KEY_DESCRIPTION;
use crate::verifier::attestation::android_safetynet::ATTEST_HOSTNAME;
use crate::verifier::attestation::apple::OID_APPLE_NONCE;
use crate::verifier::attestation::tpm::OID_TCG_KP_AIK_CERTIFICATE;

const ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";

/// # Errors
/// Any `openssl` failure.
pub fn generate_p256_key() -> Result<PKey<Private>, ErrorStack> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    PKey::from_ec_key(EcKey::generate(&group)?)
}

fn random_serial() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(63, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn asn1_time(time: DateTime<Utc>) -> Result<Asn1Time, ErrorStack> {
    Asn1Time::from_unix(time.timestamp())
}

fn name(entries: &[(&str, String)]) -> Result<X509Name, ErrorStack> {
    let mut builder = X509NameBuilder::new()?;
    for (field, value) in entries {
        builder.append_entry_by_text(field, value)?;
    }
    Ok(builder.build())
}

fn raw_extension(oid: &str, critical: bool, value: &[u8]) -> Result<X509Extension, ErrorStack> {
    let object = Asn1Object::from_str(oid)?;
    let contents = Asn1OctetString::new_from_bytes(value)?;
    X509Extension::new_from_der(&object, critical, &contents)
}

/// Subject, key and extensions of a certificate to issue
#[derive(Debug, Clone)]
pub struct LeafOptions {
    pub subject: Vec<(&'static str, String)>,
    /// Certified key; a fresh P-256 key when `None`
    pub key: Option<PKey<Private>>,
    pub dns_names: Vec<String>,
    pub extended_key_usages: Vec<String>,
    /// Raw `(oid, DER value)` extensions
    pub extensions: Vec<(String, Vec<u8>)>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Default for LeafOptions {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            subject: Vec::new(),
            key: None,
            dns_names: Vec::new(),
            extended_key_usages: Vec::new(),
            extensions: Vec::new(),
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
        }
    }
}

impl LeafOptions {
    /// Packed attestation profile: C, O, OU and CN
    #[must_use]
    pub fn packed(common_name: &str) -> Self {
        Self {
            subject: vec![
                ("C", "US".into()),
                ("O", "Passkey Verify Test".into()),
                ("OU", "Authenticator Attestation".into()),
                ("CN", common_name.into()),
            ],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fido_u2f(common_name: &str) -> Self {
        Self {
            subject: vec![("CN", common_name.into())],
            ..Self::default()
        }
    }

    /// TPM attestation identity key: empty subject, SAN and the AIK EKU
    #[must_use]
    pub fn tpm_aik() -> Self {
        Self {
            dns_names: vec!["tpm.test.invalid".into()],
            extended_key_usages: vec![OID_TCG_KP_AIK_CERTIFICATE.into()],
            ..Self::default()
        }
    }

    /// Android Keystore certificate carrying a `KeyDescription`
    #[must_use]
    pub fn android_key(key_description: Vec<u8>) -> Self {
        Self {
            subject: vec![("CN", "Android Keystore Key".into())],
            extensions: vec![(OID_ANDROID_KEY_DESCRIPTION.into(), key_description)],
            ..Self::default()
        }
    }

    /// Apple anonymous attestation certificate holding `nonce`
    #[must_use]
    pub fn apple(nonce: &[u8]) -> Self {
        let value = der::sequence(&[der::explicit(1, &der::octet_string(nonce))]);
        Self {
            subject: vec![("CN", "Apple Anonymous Attestation Test".into())],
            extensions: vec![(OID_APPLE_NONCE.into(), value)],
            ..Self::default()
        }
    }

    /// SafetyNet response signer
    #[must_use]
    pub fn safetynet() -> Self {
        Self {
            subject: vec![("CN", ATTEST_HOSTNAME.into())],
            dns_names: vec![ATTEST_HOSTNAME.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: PKey<Private>) -> Self {
        self.key = Some(key);
        self
    }

    /// Add the id-fido-gen-ce-aaguid extension
    #[must_use]
    pub fn with_aaguid(mut self, aaguid: Uuid) -> Self {
        self.extensions.push((
            OID_FIDO_GEN_CE_AAGUID.into(),
            der::octet_string(aaguid.as_bytes()),
        ));
        self
    }

    #[must_use]
    pub fn valid_between(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }
}

/// A CA certificate with its signing key
#[derive(Debug, Clone)]
pub struct TestCertificateAuthority {
    pub certificate: X509,
    pub key: PKey<Private>,
}

impl TestCertificateAuthority {
    /// Self-signed root
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn root(common_name: &str) -> Result<Self, ErrorStack> {
        let key = generate_p256_key()?;
        let subject = name(&[("O", "Passkey Verify Test".into()), ("CN", common_name.into())])?;
        let certificate = Self::ca_certificate(&subject, &key, &subject, &key)?;
        Ok(Self { certificate, key })
    }

    /// Intermediate CA issued by this one
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn intermediate(&self, common_name: &str) -> Result<Self, ErrorStack> {
        let key = generate_p256_key()?;
        let subject = name(&[("O", "Passkey Verify Test".into()), ("CN", common_name.into())])?;
        let certificate =
            Self::ca_certificate(&subject, &key, self.certificate.subject_name(), &self.key)?;
        Ok(Self { certificate, key })
    }

    fn ca_certificate(
        subject: &X509NameRef,
        key: &PKey<Private>,
        issuer: &X509NameRef,
        issuer_key: &PKey<Private>,
    ) -> Result<X509, ErrorStack> {
        let now = Utc::now();
        let serial = random_serial()?;
        let not_before = asn1_time(now - Duration::days(1))?;
        let not_after = asn1_time(now + Duration::days(3650))?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(subject)?;
        builder.set_issuer_name(issuer)?;
        builder.set_pubkey(key)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()?,
        )?;
        builder.sign(issuer_key, MessageDigest::sha256())?;
        Ok(builder.build())
    }

    /// Issue an end-entity certificate
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn issue_leaf(&self, options: &LeafOptions) -> Result<(X509, PKey<Private>), ErrorStack> {
        let key = match &options.key {
            Some(key) => key.clone(),
            None => generate_p256_key()?,
        };

        let serial = random_serial()?;
        let subject = name(&options.subject)?;
        let not_before = asn1_time(options.not_before)?;
        let not_after = asn1_time(options.not_after)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&subject)?;
        builder.set_issuer_name(self.certificate.subject_name())?;
        builder.set_pubkey(&key)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.append_extension(BasicConstraints::new().build()?)?;

        if !options.dns_names.is_empty() {
            let mut san = SubjectAlternativeName::new();
            // an empty subject needs a critical SAN
            if options.subject.is_empty() {
                san.critical();
            }
            for dns in &options.dns_names {
                san.dns(dns);
            }
            let extension = san.build(&builder.x509v3_context(Some(&self.certificate), None))?;
            builder.append_extension(extension)?;
        }
        if !options.extended_key_usages.is_empty() {
            let mut usages = ExtendedKeyUsage::new();
            for oid in &options.extended_key_usages {
                usages.other(oid);
            }
            builder.append_extension(usages.build()?)?;
        }
        for (oid, value) in &options.extensions {
            builder.append_extension(raw_extension(oid, false, value)?)?;
        }

        builder.sign(&self.key, MessageDigest::sha256())?;
        Ok((builder.build(), key))
    }

    /// A v2 CRL revoking `revoked`, signed by this CA
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn crl(&self, revoked: &[&X509]) -> Result<X509Crl, ErrorStack> {
        let now = Utc::now();
        self.crl_valid_between(revoked, now - Duration::hours(1), now + Duration::days(7))
    }

    /// A CRL revoking `revoked` with the given thisUpdate and nextUpdate
    ///
    /// # Errors
    /// Any `openssl` failure.
    pub fn crl_valid_between(
        &self,
        revoked: &[&X509],
        this_update: DateTime<Utc>,
        next_update: DateTime<Utc>,
    ) -> Result<X509Crl, ErrorStack> {
        let algorithm = der::sequence(&[der::oid(ECDSA_WITH_SHA256)]);

        let mut entries = Vec::with_capacity(revoked.len());
        for certificate in revoked {
            let serial = certificate.serial_number().to_bn()?.to_vec();
            entries.push(der::sequence(&[
                der::unsigned_integer(&serial),
                der::utc_time(this_update),
            ]));
        }

        let mut tbs = vec![
            der::integer(1),
            algorithm.clone(),
            self.certificate.subject_name().to_der()?,
            der::utc_time(this_update),
            der::utc_time(next_update),
        ];
        if !entries.is_empty() {
            tbs.push(der::sequence(&entries));
        }
        let tbs = der::sequence(&tbs);

        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(&tbs)?;
        let signature = signer.sign_to_vec()?;

        X509Crl::from_der(&der::sequence(&[tbs, algorithm, der::bit_string(&signature)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::x509::CertificateProfile;

    #[test]
    fn test_packed_leaf_profile() {
        let root = TestCertificateAuthority::root("Profile Root").unwrap();
        let aaguid = Uuid::from_bytes([9; 16]);
        let (leaf, _) = root
            .issue_leaf(&LeafOptions::packed("Profile Leaf").with_aaguid(aaguid))
            .unwrap();
        let profile = CertificateProfile::parse(&leaf.to_der().unwrap()).unwrap();

        assert_eq!(profile.version, 3);
        assert_eq!(profile.organizational_unit.as_deref(), Some("Authenticator Attestation"));
        assert_eq!(profile.basic_constraints_ca, Some(false));
        assert!(leaf.verify(&root.certificate.public_key().unwrap()).unwrap());
    }

    #[test]
    fn test_tpm_aik_profile() {
        let root = TestCertificateAuthority::root("TPM Root").unwrap();
        let (aik, _) = root.issue_leaf(&LeafOptions::tpm_aik()).unwrap();
        let profile = CertificateProfile::parse(&aik.to_der().unwrap()).unwrap();

        assert!(profile.subject_empty);
        assert!(profile.has_subject_alt_name);
        assert_eq!(profile.extended_key_usages, vec![OID_TCG_KP_AIK_CERTIFICATE.to_string()]);
    }

    #[test]
    fn test_crl_lists_revoked_serial() {
        let root = TestCertificateAuthority::root("CRL Root").unwrap();
        let (leaf, _) = root.issue_leaf(&LeafOptions::packed("Leaf")).unwrap();
        let crl = root.crl(&[&leaf]).unwrap();

        assert!(crl.verify(&root.certificate.public_key().unwrap()).unwrap());
        assert_eq!(crl.get_revoked().map_or(0, |revoked| revoked.len()), 1);
    }
}
