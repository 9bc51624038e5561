//! Single-flight metadata BLOB cache
//!
//! A cached BLOB is served until its `nextUpdate` date. When it is missing
//! or stale, the first caller starts one refresh and every caller arriving
//! before it completes awaits the same shared result. A failed refresh keeps
//! the previous BLOB and is reported only to that cycle's waiters.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};

use crate::error::MetadataError;
use crate::metadata::blob::MetadataBlob;
use crate::metadata::provider::MetadataBlobProvider;

/// Source of "today" for freshness decisions
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<MetadataBlob>, MetadataError>>>;

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Refreshing,
    Cached,
    Stale,
}

#[derive(Default)]
struct CacheSlot {
    blob: Option<Arc<MetadataBlob>>,
    fetched_on: Option<NaiveDate>,
    in_flight: Option<SharedRefresh>,
}

impl CacheSlot {
    /// Fresh until `nextUpdate`; a BLOB already fetched today is not
    /// refetched even if the service published a past `nextUpdate`
    fn fresh_blob(&self, today: NaiveDate) -> Option<&Arc<MetadataBlob>> {
        self.blob
            .as_ref()
            .filter(|blob| today < blob.next_update() || self.fetched_on == Some(today))
    }
}

struct Inner {
    provider: Arc<dyn MetadataBlobProvider>,
    slot: Mutex<CacheSlot>,
    clock: Clock,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }
}

/// Caches the BLOB of an inner provider with single-flight refresh
#[derive(Clone)]
pub struct CachingMetadataBlobProvider {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CachingMetadataBlobProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingMetadataBlobProvider")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CachingMetadataBlobProvider {
    #[must_use]
    pub fn new(provider: Arc<dyn MetadataBlobProvider>) -> Self {
        Self::with_clock(provider, Arc::new(|| Utc::now().date_naive()))
    }

    #[must_use]
    pub fn with_clock(provider: Arc<dyn MetadataBlobProvider>, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                slot: Mutex::new(CacheSlot::default()),
                clock,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        let slot = self.inner.lock();
        if slot.in_flight.is_some() {
            CacheState::Refreshing
        } else if slot.blob.is_none() {
            CacheState::Empty
        } else if slot.fresh_blob(self.inner.today()).is_some() {
            CacheState::Cached
        } else {
            CacheState::Stale
        }
    }

    /// The cached BLOB without triggering a refresh
    #[must_use]
    pub fn cached(&self) -> Option<Arc<MetadataBlob>> {
        self.inner.lock().blob.clone()
    }

    /// Current BLOB, refreshing it first when missing or stale
    ///
    /// # Errors
    /// The failure of the refresh this call joined.
    pub async fn provide(&self) -> Result<Arc<MetadataBlob>, MetadataError> {
        let refresh = {
            let mut slot = self.inner.lock();
            if let Some(blob) = slot.fresh_blob(self.inner.today()) {
                return Ok(Arc::clone(blob));
            }
            match &slot.in_flight {
                Some(refresh) => {
                    debug!("Joining in-flight metadata BLOB refresh");
                    refresh.clone()
                }
                None => {
                    let refresh = Self::refresh(Arc::clone(&self.inner)).boxed().shared();
                    slot.in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };
        refresh.await
    }

    async fn refresh(inner: Arc<Inner>) -> Result<Arc<MetadataBlob>, MetadataError> {
        info!("🔄 Refreshing metadata BLOB");
        let result = inner.provider.fetch().await.map(Arc::new);

        let mut slot = inner.lock();
        slot.in_flight = None;
        match &result {
            Ok(blob) => {
                info!(
                    "✅ Metadata BLOB #{} cached until {}",
                    blob.serial(),
                    blob.next_update()
                );
                slot.blob = Some(Arc::clone(blob));
                slot.fetched_on = Some(inner.today());
            }
            Err(e) => warn!("⚠️ Metadata BLOB refresh failed: {e}"),
        }
        result
    }
}

#[async_trait]
impl MetadataBlobProvider for CachingMetadataBlobProvider {
    async fn fetch(&self) -> Result<MetadataBlob, MetadataError> {
        self.provide().await.map(|blob| blob.as_ref().clone())
    }
}
