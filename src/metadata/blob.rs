//! FIDO Metadata Service (MDS3) BLOB
//!
//! The BLOB is a compact JWS whose `x5c` signer chain must lead to a
//! configured root; its payload lists one entry per authenticator model.

use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use openssl::x509::X509;
use serde::Deserialize;
use uuid::Uuid;

use crate::codec::base64url;
use crate::crypto::jws::CompactJws;
use crate::error::MetadataError;
use crate::verifier::trust::{CertPathVerifier, TrustAnchor};

/// Authenticator status values from MDS status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticatorStatus {
    NotFidoCertified,
    FidoCertified,
    UserVerificationBypass,
    AttestationKeyCompromise,
    UserKeyRemoteCompromise,
    UserKeyPhysicalCompromise,
    UpdateAvailable,
    Revoked,
    SelfAssertionSubmitted,
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
    #[serde(other)]
    Unknown,
}

impl AuthenticatorStatus {
    /// Statuses that withdraw all trust from an authenticator model
    #[must_use]
    pub fn is_compromised(self) -> bool {
        matches!(
            self,
            Self::AttestationKeyCompromise
                | Self::UserVerificationBypass
                | Self::UserKeyRemoteCompromise
                | Self::UserKeyPhysicalCompromise
                | Self::Revoked
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: AuthenticatorStatus,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub certificate_number: Option<String>,
}

/// The subset of a metadata statement used for trust decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attestation_types: Vec<String>,
    /// Standard base64 DER certificates
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    #[serde(default)]
    pub aaid: Option<String>,
    #[serde(default)]
    pub aaguid: Option<Uuid>,
    /// Hex SHA-1 identifiers of U2F attestation certificate keys
    #[serde(default)]
    pub attestation_certificate_key_identifiers: Vec<String>,
    #[serde(default)]
    pub metadata_statement: Option<MetadataStatement>,
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
    #[serde(default)]
    pub time_of_last_status_change: Option<NaiveDate>,
}

impl MetadataEntry {
    pub fn statuses(&self) -> impl Iterator<Item = AuthenticatorStatus> + '_ {
        self.status_reports.iter().map(|report| report.status)
    }

    #[must_use]
    pub fn has_key_identifier(&self, key_identifier: &str) -> bool {
        self.attestation_certificate_key_identifiers
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(key_identifier))
    }

    /// Decoded attestation root certificates; undecodable ones are skipped
    #[must_use]
    pub fn trust_anchors(&self) -> Vec<TrustAnchor> {
        let Some(statement) = &self.metadata_statement else {
            return Vec::new();
        };
        statement
            .attestation_root_certificates
            .iter()
            .filter_map(|encoded| {
                let certificate = base64url::decode_standard(encoded)
                    .map_err(|e| e.to_string())
                    .and_then(|der| X509::from_der(&der).map_err(|e| e.to_string()));
                match certificate {
                    Ok(certificate) => Some(TrustAnchor::new(certificate)),
                    Err(e) => {
                        warn!("⚠️ Skipping undecodable metadata root certificate: {e}");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Decoded BLOB payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayload {
    #[serde(default)]
    pub legal_header: Option<String>,
    pub no: u64,
    pub next_update: NaiveDate,
    #[serde(default)]
    pub entries: Vec<MetadataEntry>,
}

/// A BLOB whose signature and signer chain have been validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlob {
    payload: MetadataBlobPayload,
}

impl MetadataBlob {
    /// Wrap an already trusted payload
    #[must_use]
    pub fn from_payload(payload: MetadataBlobPayload) -> Self {
        Self { payload }
    }

    /// Parse the JWS, check its signature and chain it to `roots`
    ///
    /// Returns the blob together with the validated signer path so callers
    /// can run revocation checks on it.
    ///
    /// # Errors
    /// `Malformed`, `BadSignature` or `UntrustedSigner`.
    pub fn from_jws(token: &str, roots: &[X509]) -> Result<(Self, Vec<X509>), MetadataError> {
        let jws = CompactJws::parse(token).map_err(MetadataError::Malformed)?;
        let chain = jws.certificates().map_err(MetadataError::Malformed)?;
        let signer = chain
            .first()
            .ok_or_else(|| MetadataError::Malformed("BLOB has no signer certificate".into()))?;
        jws.verify(signer).map_err(MetadataError::BadSignature)?;

        let chain_der = chain
            .iter()
            .map(|certificate| certificate.to_der())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MetadataError::Malformed(e.to_string()))?;
        let anchors: Vec<TrustAnchor> = roots.iter().cloned().map(TrustAnchor::new).collect();
        let path = CertPathVerifier::new()
            .build_path(&chain_der, &anchors, Utc::now())
            .map_err(|e| MetadataError::UntrustedSigner(e.to_string()))?;

        let payload: MetadataBlobPayload = serde_json::from_slice(&jws.payload)
            .map_err(|e| MetadataError::Malformed(format!("payload: {e}")))?;
        debug!(
            "Metadata BLOB #{} parsed with {} entries, next update {}",
            payload.no,
            payload.entries.len(),
            payload.next_update
        );
        Ok((Self { payload }, path))
    }

    #[must_use]
    pub fn payload(&self) -> &MetadataBlobPayload {
        &self.payload
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.payload.no
    }

    #[must_use]
    pub fn next_update(&self) -> NaiveDate {
        self.payload.next_update
    }

    #[must_use]
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.payload.entries
    }

    #[must_use]
    pub fn find_by_aaguid(&self, aaguid: &Uuid) -> Option<&MetadataEntry> {
        self.payload
            .entries
            .iter()
            .find(|entry| entry.aaguid.as_ref() == Some(aaguid))
    }

    pub fn find_by_key_identifier<'a>(
        &'a self,
        key_identifier: &'a str,
    ) -> impl Iterator<Item = &'a MetadataEntry> + 'a {
        self.payload
            .entries
            .iter()
            .filter(move |entry| entry.has_key_identifier(key_identifier))
    }
}

/// Which metadata entries may contribute trust anchors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataPolicy {
    pub not_fido_certified_allowed: bool,
    pub self_assertion_submitted_allowed: bool,
}

impl MetadataPolicy {
    #[must_use]
    pub fn accepts(&self, entry: &MetadataEntry) -> bool {
        entry.statuses().all(|status| match status {
            status if status.is_compromised() => false,
            AuthenticatorStatus::NotFidoCertified => self.not_fido_certified_allowed,
            AuthenticatorStatus::SelfAssertionSubmitted => self.self_assertion_submitted_allowed,
            _ => true,
        })
    }
}
