//! CRL-based revocation checking
//!
//! Sync verification only consults CRLs supplied up front; async
//! verification also fetches each certificate's distribution points.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, info};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::{CrlStatus, X509Crl, X509CrlRef, X509};

use crate::crypto::x509::crl_distribution_uris;
use crate::error::VerificationError;

/// Parse a CRL in DER or PEM form
///
/// # Errors
/// `DataConversion` when the bytes are not a CRL.
pub fn parse_crl(bytes: &[u8]) -> Result<X509Crl, VerificationError> {
    X509Crl::from_der(bytes)
        .or_else(|_| X509Crl::from_pem(bytes))
        .map_err(|e| VerificationError::DataConversion(format!("invalid CRL: {e}")))
}

/// Check every non-anchor certificate of a validated path against `crls`
///
/// `path` is leaf first, each certificate followed by its issuer. A CRL only
/// counts for a certificate if it verifies under that issuer's key and
/// `timestamp` falls between its thisUpdate and nextUpdate. Every non-anchor
/// certificate must be covered by at least one such CRL.
///
/// # Errors
/// `CertPath` when a certificate is listed as revoked or no usable CRL
/// covers it.
pub fn check_revocation(
    path: &[X509],
    crls: &[&X509Crl],
    timestamp: DateTime<Utc>,
) -> Result<(), VerificationError> {
    let at = Asn1Time::from_unix(timestamp.timestamp())?;
    for pair in path.windows(2) {
        let (certificate, issuer) = (&pair[0], &pair[1]);
        let issuer_key = issuer.public_key()?;
        let mut covered = false;
        for crl in crls {
            if !crl.verify(&issuer_key).unwrap_or(false) || !is_current(crl, &at)? {
                continue;
            }
            covered = true;
            if let CrlStatus::Revoked(_) = crl.get_by_cert(certificate) {
                debug!("❌ Certificate {:?} is revoked", certificate.subject_name());
                return Err(VerificationError::CertPath("certificate revoked".into()));
            }
        }
        if !covered {
            debug!(
                "❌ No current CRL covers certificate {:?}",
                certificate.subject_name()
            );
            return Err(VerificationError::CertPath("revocation status unknown".into()));
        }
    }
    Ok(())
}

fn is_current(crl: &X509CrlRef, at: &Asn1TimeRef) -> Result<bool, VerificationError> {
    if crl.last_update().compare(at)? == Ordering::Greater {
        return Ok(false);
    }
    match crl.next_update() {
        Some(next_update) => Ok(next_update.compare(at)? != Ordering::Less),
        None => Ok(true),
    }
}

async fn fetch_crl(client: &reqwest::Client, uri: &str) -> Result<X509Crl, VerificationError> {
    let failed = |e: String| VerificationError::CertPath(format!("CRL fetch from {uri} failed: {e}"));
    let response = client
        .get(uri)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| failed(e.to_string()))?;
    let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    parse_crl(&body).map_err(|e| failed(e.to_string()))
}

/// Fetch the CRLs named by the distribution points of `certificates`
///
/// Fetches run concurrently; certificates without a distribution point are
/// skipped.
///
/// # Errors
/// `CertPath` if any fetch fails.
pub async fn fetch_crls(
    client: &reqwest::Client,
    certificates: &[X509],
) -> Result<Vec<X509Crl>, VerificationError> {
    let mut uris: Vec<String> = certificates.iter().flat_map(crl_distribution_uris).collect();
    uris.sort();
    uris.dedup();
    if uris.is_empty() {
        return Ok(Vec::new());
    }

    info!("🔄 Fetching {} CRL(s) for revocation check", uris.len());
    try_join_all(uris.iter().map(|uri| fetch_crl(client, uri))).await
}
