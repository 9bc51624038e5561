//! `android-safetynet` format: SafetyNet attestation JWS

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;

use crate::codec::base64url;
use crate::crypto::jws::CompactJws;
use crate::crypto::x509::CertificateProfile;
use crate::crypto::{sha256, signed_data};
use crate::data::{AndroidSafetyNetStatement, AttestationType};
use crate::error::VerificationError;
use crate::verifier::attestation::{bad_statement, leaf, AttestationOutcome, SafetyNetOptions};
use crate::verifier::RegistrationObject;

pub const ATTEST_HOSTNAME: &str = "attest.android.com";

/// Claims of the SafetyNet attestation response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetResponse {
    pub nonce: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub apk_package_name: Option<String>,
    #[serde(default)]
    pub cts_profile_match: bool,
    #[serde(default)]
    pub basic_integrity: bool,
}

/// # Errors
/// `BadAttestationStatement` for an unverifiable JWS, a foreign signer, a
/// wrong nonce, a failed CTS profile or a timestamp outside the window.
pub fn verify(
    statement: &AndroidSafetyNetStatement,
    object: &RegistrationObject<'_>,
    options: SafetyNetOptions,
) -> Result<AttestationOutcome, VerificationError> {
    if statement.ver.is_empty() {
        return Err(bad_statement("SafetyNet statement has an empty ver"));
    }
    let token = std::str::from_utf8(&statement.response)
        .map_err(|_| bad_statement("SafetyNet response is not UTF-8"))?;
    let jws = CompactJws::parse(token).map_err(bad_statement)?;
    let chain = jws.certificates().map_err(bad_statement)?;
    let signer = leaf(&chain)?;
    jws.verify(signer)
        .map_err(|e| bad_statement(format!("SafetyNet JWS signature: {e}")))?;

    let signer_der = signer.to_der()?;
    let profile = CertificateProfile::parse(&signer_der)?;
    let hostname_matches = profile.common_name.as_deref() == Some(ATTEST_HOSTNAME)
        || profile.dns_names.iter().any(|name| name == ATTEST_HOSTNAME);
    if !hostname_matches {
        return Err(bad_statement(format!(
            "SafetyNet response not issued to {ATTEST_HOSTNAME}"
        )));
    }

    let response: SafetyNetResponse = serde_json::from_slice(&jws.payload)
        .map_err(|e| bad_statement(format!("SafetyNet payload: {e}")))?;

    let expected_nonce = base64url::encode_standard(&sha256(&signed_data(
        object.authenticator_data_bytes(),
        &object.client_data_hash,
    )));
    if response.nonce != expected_nonce {
        return Err(bad_statement("SafetyNet nonce does not match the signed data"));
    }
    if !response.cts_profile_match {
        return Err(bad_statement("SafetyNet ctsProfileMatch is false"));
    }

    let issued = Utc
        .timestamp_millis_opt(response.timestamp_ms)
        .single()
        .ok_or_else(|| bad_statement("SafetyNet timestampMs is out of range"))?;
    let max_age = ChronoDuration::from_std(options.max_age)
        .map_err(|_| bad_statement("SafetyNet max age out of range"))?;
    let tolerance = ChronoDuration::from_std(options.forward_tolerance)
        .map_err(|_| bad_statement("SafetyNet forward tolerance out of range"))?;
    let earliest = object
        .timestamp
        .checked_sub_signed(max_age)
        .ok_or_else(|| bad_statement("SafetyNet max age out of range"))?;
    let latest = object
        .timestamp
        .checked_add_signed(tolerance)
        .ok_or_else(|| bad_statement("SafetyNet forward tolerance out of range"))?;
    if issued < earliest || issued > latest {
        return Err(bad_statement(format!(
            "SafetyNet response timestamp {issued} outside the acceptance window"
        )));
    }

    let certificates = chain
        .iter()
        .map(|certificate| certificate.to_der().map_err(VerificationError::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AttestationOutcome::new(AttestationType::Basic, certificates))
}
