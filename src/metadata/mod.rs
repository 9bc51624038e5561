//! FIDO metadata as a trust anchor source
//!
//! - [`blob`] - MDS3 BLOB model, JWS validation and status policy
//! - [`provider`] - HTTP and local file BLOB sources
//! - [`cache`] - single-flight BLOB cache
//! - [`repository`] - trust anchor repositories over a BLOB or the cache

pub mod blob;
pub mod cache;
pub mod provider;
pub mod repository;

pub use blob::{AuthenticatorStatus, MetadataBlob, MetadataBlobPayload, MetadataEntry, MetadataPolicy};
pub use cache::{CacheState, CachingMetadataBlobProvider, Clock};
pub use provider::{FidoMds3BlobProvider, LocalFileBlobProvider, MetadataBlobProvider};
pub use repository::{MetadataBlobTrustAnchorRepository, MetadataTrustAnchorRepository};
