//! Sources of metadata BLOBs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use openssl::x509::X509;
use url::Url;

use crate::error::MetadataError;
use crate::metadata::blob::MetadataBlob;
use crate::verifier::trust::revocation::{check_revocation, fetch_crls};

/// Default FIDO Alliance MDS3 endpoint
pub const FIDO_MDS3_ENDPOINT: &str = "https://mds3.fidoalliance.org/";

/// Fetches and validates a metadata BLOB
#[async_trait]
pub trait MetadataBlobProvider: Send + Sync {
    /// # Errors
    /// Any fetch, parse, signature or signer chain failure.
    async fn fetch(&self) -> Result<MetadataBlob, MetadataError>;
}

/// Load root certificates (PEM bundle or single DER) for BLOB validation
///
/// # Errors
/// `Malformed` when the file cannot be read or holds no certificate.
pub async fn load_root_certificates(path: &Path) -> Result<Vec<X509>, MetadataError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        MetadataError::Malformed(format!("cannot read root certificate {}: {e}", path.display()))
    })?;
    parse_root_certificates(&bytes)
}

/// # Errors
/// `Malformed` when the bytes hold no certificate.
pub fn parse_root_certificates(bytes: &[u8]) -> Result<Vec<X509>, MetadataError> {
    let roots = X509::stack_from_pem(bytes)
        .ok()
        .filter(|roots| !roots.is_empty())
        .or_else(|| X509::from_der(bytes).ok().map(|root| vec![root]))
        .ok_or_else(|| MetadataError::Malformed("no root certificate found".into()))?;
    Ok(roots)
}

/// Downloads the BLOB from a metadata service over HTTP
#[derive(Debug, Clone)]
pub struct FidoMds3BlobProvider {
    endpoint: Url,
    roots: Vec<X509>,
    revocation_check: bool,
    client: reqwest::Client,
}

impl FidoMds3BlobProvider {
    #[must_use]
    pub fn new(endpoint: Url, roots: Vec<X509>) -> Self {
        Self {
            endpoint,
            roots,
            revocation_check: false,
            client: reqwest::Client::new(),
        }
    }

    /// Provider for the public FIDO Alliance service
    ///
    /// # Errors
    /// Never in practice; the endpoint constant is a valid URL.
    pub fn fido_alliance(roots: Vec<X509>) -> Result<Self, MetadataError> {
        let endpoint = Url::parse(FIDO_MDS3_ENDPOINT)
            .map_err(|e| MetadataError::FetchFailed(e.to_string()))?;
        Ok(Self::new(endpoint, roots))
    }

    /// Check the signer chain against its CRL distribution points
    #[must_use]
    pub fn with_revocation_check(mut self, enabled: bool) -> Self {
        self.revocation_check = enabled;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataBlobProvider for FidoMds3BlobProvider {
    async fn fetch(&self) -> Result<MetadataBlob, MetadataError> {
        info!("🔄 Downloading metadata BLOB from {}", self.endpoint);
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MetadataError::FetchFailed(e.to_string()))?;
        let token = response
            .text()
            .await
            .map_err(|e| MetadataError::FetchFailed(e.to_string()))?;

        let (blob, signer_path) = MetadataBlob::from_jws(&token, &self.roots)?;
        if self.revocation_check {
            let non_root = signer_path.len().saturating_sub(1);
            let crls = fetch_crls(&self.client, &signer_path[..non_root])
                .await
                .map_err(|e| MetadataError::UntrustedSigner(e.to_string()))?;
            let crls: Vec<_> = crls.iter().collect();
            check_revocation(&signer_path, &crls, Utc::now())
                .map_err(|e| MetadataError::UntrustedSigner(e.to_string()))?;
        }
        debug!("Downloaded metadata BLOB #{}", blob.serial());
        Ok(blob)
    }
}

/// Reads the BLOB from a local file, for offline deployments and tests
#[derive(Debug, Clone)]
pub struct LocalFileBlobProvider {
    path: PathBuf,
    roots: Vec<X509>,
}

impl LocalFileBlobProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, roots: Vec<X509>) -> Self {
        Self {
            path: path.into(),
            roots,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataBlobProvider for LocalFileBlobProvider {
    async fn fetch(&self) -> Result<MetadataBlob, MetadataError> {
        info!("🔄 Loading metadata BLOB from {}", self.path.display());
        let token = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            MetadataError::FetchFailed(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let (blob, _) = MetadataBlob::from_jws(&token, &self.roots)?;
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::certificates::TestCertificateAuthority;
    use crate::testing::metadata::{sign_blob, MetadataSigner};

    #[tokio::test]
    async fn test_local_file_provider() {
        let signer = MetadataSigner::new().unwrap();
        let token = sign_blob(&signer, r#"{"no":3,"nextUpdate":"2030-01-01","entries":[]}"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.jwt");
        std::fs::write(&path, token).unwrap();

        let provider = LocalFileBlobProvider::new(&path, vec![signer.root.certificate.clone()]);
        let blob = provider.fetch().await.unwrap();
        assert_eq!(blob.serial(), 3);

        let stranger = TestCertificateAuthority::root("Stranger").unwrap();
        let untrusted = LocalFileBlobProvider::new(&path, vec![stranger.certificate.clone()]);
        assert!(matches!(
            untrusted.fetch().await,
            Err(MetadataError::UntrustedSigner(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let provider = LocalFileBlobProvider::new("/nonexistent/blob.jwt", Vec::new());
        assert!(matches!(
            provider.fetch().await,
            Err(MetadataError::FetchFailed(_))
        ));
    }

    #[test]
    fn test_parse_root_certificates() {
        let root = TestCertificateAuthority::root("Roots").unwrap();
        let pem = root.certificate.to_pem().unwrap();
        assert_eq!(parse_root_certificates(&pem).unwrap().len(), 1);
        let der = root.certificate.to_der().unwrap();
        assert_eq!(parse_root_certificates(&der).unwrap().len(), 1);
        assert!(parse_root_certificates(b"junk").is_err());
    }
}
