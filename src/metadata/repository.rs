//! Trust anchor repositories backed by metadata BLOBs

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::crypto::hex;
use crate::data::Aaguid;
use crate::error::VerificationError;
use crate::metadata::blob::{MetadataBlob, MetadataEntry, MetadataPolicy};
use crate::metadata::cache::CachingMetadataBlobProvider;
use crate::verifier::trust::{AsyncTrustAnchorRepository, TrustAnchor, TrustAnchorRepository};

fn anchors_from<'a>(
    entries: impl Iterator<Item = &'a MetadataEntry>,
    policy: MetadataPolicy,
) -> Vec<TrustAnchor> {
    entries
        .filter(|entry| {
            let accepted = policy.accepts(entry);
            if !accepted {
                debug!(
                    "Metadata entry {:?} excluded by status policy",
                    entry.aaguid
                );
            }
            accepted
        })
        .flat_map(MetadataEntry::trust_anchors)
        .collect()
}

fn by_aaguid(blob: &MetadataBlob, aaguid: &Aaguid, policy: MetadataPolicy) -> Vec<TrustAnchor> {
    anchors_from(blob.find_by_aaguid(aaguid).into_iter(), policy)
}

fn by_key_identifier(
    blob: &MetadataBlob,
    key_identifier: &[u8],
    policy: MetadataPolicy,
) -> Vec<TrustAnchor> {
    let key_identifier = hex(key_identifier);
    anchors_from(blob.find_by_key_identifier(&key_identifier), policy)
}

/// Trust anchors from one fixed BLOB snapshot
#[derive(Debug, Clone)]
pub struct MetadataBlobTrustAnchorRepository {
    blob: Arc<MetadataBlob>,
    policy: MetadataPolicy,
}

impl MetadataBlobTrustAnchorRepository {
    #[must_use]
    pub fn new(blob: Arc<MetadataBlob>, policy: MetadataPolicy) -> Self {
        Self { blob, policy }
    }
}

impl TrustAnchorRepository for MetadataBlobTrustAnchorRepository {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError> {
        Ok(by_aaguid(&self.blob, aaguid, self.policy))
    }

    fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError> {
        Ok(by_key_identifier(&self.blob, key_identifier, self.policy))
    }
}

/// Trust anchors from the current BLOB of a metadata cache
#[derive(Debug, Clone)]
pub struct MetadataTrustAnchorRepository {
    cache: CachingMetadataBlobProvider,
    policy: MetadataPolicy,
}

impl MetadataTrustAnchorRepository {
    #[must_use]
    pub fn new(cache: CachingMetadataBlobProvider, policy: MetadataPolicy) -> Self {
        Self { cache, policy }
    }

    #[must_use]
    pub fn cache(&self) -> &CachingMetadataBlobProvider {
        &self.cache
    }
}

#[async_trait]
impl AsyncTrustAnchorRepository for MetadataTrustAnchorRepository {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<Vec<TrustAnchor>, VerificationError> {
        let blob = self.cache.provide().await?;
        Ok(by_aaguid(&blob, aaguid, self.policy))
    }

    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<Vec<TrustAnchor>, VerificationError> {
        let blob = self.cache.provide().await?;
        Ok(by_key_identifier(&blob, key_identifier, self.policy))
    }
}
