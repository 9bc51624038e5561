//! PKIX certificate path validation against trust anchors

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509Crl, X509StoreContext, X509};

use crate::crypto::x509::{parse_chain, same_certificate};
use crate::error::VerificationError;
use crate::verifier::trust::revocation::{check_revocation, fetch_crls};
use crate::verifier::trust::TrustAnchor;

fn cert_path_error(message: impl Into<String>) -> VerificationError {
    VerificationError::CertPath(message.into())
}

/// Validates attestation chains against anchors, optionally checking CRLs
#[derive(Clone)]
pub struct CertPathVerifier {
    full_chain_prohibited: bool,
    revocation_check: bool,
    crls: Arc<[X509Crl]>,
    http: reqwest::Client,
}

impl std::fmt::Debug for CertPathVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertPathVerifier")
            .field("full_chain_prohibited", &self.full_chain_prohibited)
            .field("revocation_check", &self.revocation_check)
            .field("crls", &self.crls.len())
            .finish_non_exhaustive()
    }
}

impl Default for CertPathVerifier {
    fn default() -> Self {
        Self {
            full_chain_prohibited: false,
            revocation_check: false,
            crls: Arc::from(Vec::new()),
            http: reqwest::Client::new(),
        }
    }
}

impl CertPathVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `x5c` chains that already include a trust anchor
    #[must_use]
    pub fn with_full_chain_prohibited(mut self, prohibited: bool) -> Self {
        self.full_chain_prohibited = prohibited;
        self
    }

    #[must_use]
    pub fn with_revocation_check(mut self, enabled: bool) -> Self {
        self.revocation_check = enabled;
        self
    }

    /// CRLs consulted by every revocation check
    #[must_use]
    pub fn with_crls(mut self, crls: Vec<X509Crl>) -> Self {
        self.crls = Arc::from(crls);
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Build and validate the path from `chain[0]` to one of `anchors` at
    /// `timestamp`, returning it leaf first
    ///
    /// # Errors
    /// `CertPath` when no valid path exists or the chain embeds an anchor
    /// while that is prohibited.
    pub fn build_path(
        &self,
        chain: &[Vec<u8>],
        anchors: &[TrustAnchor],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<X509>, VerificationError> {
        let certificates = parse_chain(chain)?;
        let (leaf, intermediates) = certificates
            .split_first()
            .ok_or_else(|| cert_path_error("certificate chain is empty"))?;

        if self.full_chain_prohibited
            && certificates.iter().any(|certificate| {
                anchors
                    .iter()
                    .any(|anchor| same_certificate(certificate, &anchor.certificate))
            })
        {
            return Err(cert_path_error(
                "attestation chain must not include a trust anchor",
            ));
        }

        let mut store = X509StoreBuilder::new()?;
        for anchor in anchors {
            store.add_cert(anchor.certificate.clone())?;
        }
        let mut param = X509VerifyParam::new()?;
        param.set_time(timestamp.timestamp() as _);
        // Metadata anchors are frequently intermediates
        param.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;
        store.set_param(&param)?;
        let store = store.build();

        let mut untrusted = Stack::new()?;
        for certificate in intermediates {
            untrusted.push(certificate.clone())?;
        }

        let mut context = X509StoreContext::new()?;
        let outcome = context.init(&store, leaf, &untrusted, |ctx| {
            if ctx.verify_cert()? {
                let path = ctx
                    .chain()
                    .map(|stack| stack.iter().map(ToOwned::to_owned).collect::<Vec<X509>>())
                    .unwrap_or_default();
                Ok(Ok(path))
            } else {
                Ok(Err(ctx.error().error_string().to_string()))
            }
        })?;

        outcome.map_err(|reason| {
            debug!("❌ Attestation certificate path rejected: {reason}");
            cert_path_error(reason)
        })
    }

    /// Validate the chain and check preloaded CRLs when enabled
    ///
    /// # Errors
    /// `CertPath` for an invalid or revoked path, or when revocation checking
    /// is on and no current CRL covers a certificate of the path.
    pub fn verify(
        &self,
        chain: &[Vec<u8>],
        anchors: &[TrustAnchor],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<X509>, VerificationError> {
        let path = self.build_path(chain, anchors, timestamp)?;
        if self.revocation_check {
            let crls: Vec<&X509Crl> = self.crls.iter().collect();
            check_revocation(&path, &crls, timestamp)?;
        }
        Ok(path)
    }

    /// Like [`Self::verify`], but also fetches CRLs from distribution points
    ///
    /// # Errors
    /// `CertPath` for an invalid or revoked path or a failed CRL fetch.
    pub async fn verify_async(
        &self,
        chain: &[Vec<u8>],
        anchors: &[TrustAnchor],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<X509>, VerificationError> {
        let path = self.build_path(chain, anchors, timestamp)?;
        if self.revocation_check {
            let non_anchor = path.len().saturating_sub(1);
            let fetched = fetch_crls(&self.http, &path[..non_anchor]).await?;
            let crls: Vec<&X509Crl> = fetched.iter().chain(self.crls.iter()).collect();
            check_revocation(&path, &crls, timestamp)?;
        }
        Ok(path)
    }
}
