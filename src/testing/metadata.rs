//! Signed metadata BLOBs for provider and repository tests

use chrono::NaiveDate;
use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::codec::base64url;
use crate::testing::certificates::{LeafOptions, TestCertificateAuthority};
use crate::testing::jws::sign_compact;

/// A BLOB signing certificate issued by its own root
#[derive(Debug, Clone)]
pub struct MetadataSigner {
    pub root: TestCertificateAuthority,
    pub certificate: X509,
    key: PKey<Private>,
}

impl MetadataSigner {
    /// # Errors
    /// Any `openssl` failure.
    pub fn new() -> Result<Self, ErrorStack> {
        let root = TestCertificateAuthority::root("Metadata Test Root")?;
        let (certificate, key) = root.issue_leaf(&LeafOptions::fido_u2f("Metadata BLOB Signer"))?;
        Ok(Self {
            root,
            certificate,
            key,
        })
    }
}

/// Sign a BLOB payload as the metadata service would
///
/// # Errors
/// Any `openssl` failure.
pub fn sign_blob(signer: &MetadataSigner, payload_json: &str) -> Result<String, ErrorStack> {
    sign_compact(&signer.key, &[&signer.certificate], payload_json.as_bytes())
}

/// BLOB payload JSON
#[must_use]
pub fn blob_payload(no: u64, next_update: NaiveDate, entries: &[Value]) -> String {
    json!({
        "legalHeader": "Test metadata, not for production use",
        "no": no,
        "nextUpdate": next_update.format("%Y-%m-%d").to_string(),
        "entries": entries,
    })
    .to_string()
}

/// Metadata entry whose statement names `root` as the attestation root
///
/// # Errors
/// Any `openssl` failure.
pub fn entry_json(aaguid: Uuid, root: &X509, status: &str) -> Result<Value, ErrorStack> {
    Ok(json!({
        "aaguid": aaguid.to_string(),
        "metadataStatement": {
            "description": "Passkey Verify Test Authenticator",
            "attestationTypes": ["basic_full"],
            "attestationRootCertificates": [base64url::encode_standard(&root.to_der()?)],
        },
        "statusReports": [{ "status": status, "effectiveDate": "2024-01-01" }],
        "timeOfLastStatusChange": "2024-01-01",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBlob;

    #[test]
    fn test_signed_blob_chains_to_root() {
        let signer = MetadataSigner::new().unwrap();
        let vendor = TestCertificateAuthority::root("Vendor").unwrap();
        let aaguid = Uuid::from_bytes([4; 16]);
        let payload = blob_payload(
            7,
            NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            &[entry_json(aaguid, &vendor.certificate, "FIDO_CERTIFIED").unwrap()],
        );
        let token = sign_blob(&signer, &payload).unwrap();

        let (blob, path) = MetadataBlob::from_jws(&token, &[signer.root.certificate.clone()]).unwrap();
        assert_eq!(blob.serial(), 7);
        assert_eq!(path.len(), 2);
        assert_eq!(blob.find_by_aaguid(&aaguid).unwrap().trust_anchors().len(), 1);
    }
}
