//! In-memory metadata BLOB provider
//!
//! Counts fetches, can be told to fail, and can hold a fetch open until the
//! test releases it so concurrent callers pile up behind one refresh.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use crate::error::MetadataError;
use crate::metadata::blob::{MetadataBlob, MetadataBlobPayload, MetadataEntry};
use crate::metadata::provider::MetadataBlobProvider;

/// Serves a fresh BLOB per fetch, numbered by fetch count
#[derive(Debug)]
pub struct MockBlobProvider {
    next_update: NaiveDate,
    entries: Vec<MetadataEntry>,
    fetches: AtomicU64,
    failures: Mutex<VecDeque<MetadataError>>,
    gate: Option<Notify>,
}

impl MockBlobProvider {
    #[must_use]
    pub fn new(next_update: NaiveDate) -> Self {
        Self {
            next_update,
            entries: Vec::new(),
            fetches: AtomicU64::new(0),
            failures: Mutex::new(VecDeque::new()),
            gate: None,
        }
    }

    /// Fetches wait for [`release`](Self::release) before completing
    #[must_use]
    pub fn gated(next_update: NaiveDate) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new(next_update)
        }
    }

    #[must_use]
    pub fn with_entries(mut self, entries: Vec<MetadataEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Let one waiting (or the next) fetch complete
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// The next fetch fails with `error`
    pub fn fail_next(&self, error: MetadataError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataBlobProvider for MockBlobProvider {
    async fn fetch(&self) -> Result<MetadataBlob, MetadataError> {
        let no = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(MetadataBlob::from_payload(MetadataBlobPayload {
            legal_header: None,
            no,
            next_update: self.next_update,
            entries: self.entries.clone(),
        }))
    }
}
