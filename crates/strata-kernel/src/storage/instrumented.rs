//! Call-counting storage wrapper.
//!
//! Wraps any [`BlobStorage`] and counts backend round trips per operation.
//! Used to observe cache effectiveness: a cached `exists` should not reach
//! the backend at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::trace;

use strata_types::BlobMetadata;

use super::{BlobCapabilities, BlobReader, BlobStorage, ListPage, StorageResult, UploadOptions};

#[derive(Debug, Default)]
struct Counters {
    upload: AtomicU64,
    open_read: AtomicU64,
    delete: AtomicU64,
    exists: AtomicU64,
    get_metadata: AtomicU64,
    list_page: AtomicU64,
    set_metadata: AtomicU64,
    rename: AtomicU64,
    legal_hold: AtomicU64,
}

/// Point-in-time copy of the call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub upload: u64,
    pub open_read: u64,
    pub delete: u64,
    pub exists: u64,
    pub get_metadata: u64,
    pub list_page: u64,
    pub set_metadata: u64,
    pub rename: u64,
    pub legal_hold: u64,
}

impl CallSnapshot {
    /// Calls that only look up blob state (`exists` + `get_metadata`).
    pub fn lookups(&self) -> u64 {
        self.exists + self.get_metadata
    }

    /// Every counted call.
    pub fn total(&self) -> u64 {
        self.upload
            + self.open_read
            + self.delete
            + self.exists
            + self.get_metadata
            + self.list_page
            + self.set_metadata
            + self.rename
            + self.legal_hold
    }
}

/// Storage wrapper that counts calls into the inner backend.
#[derive(Debug)]
pub struct InstrumentedStorage<S> {
    inner: S,
    counters: Counters,
}

impl<S: BlobStorage> InstrumentedStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counters: Counters::default(),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Current counter values.
    pub fn calls(&self) -> CallSnapshot {
        let c = &self.counters;
        CallSnapshot {
            upload: c.upload.load(Ordering::SeqCst),
            open_read: c.open_read.load(Ordering::SeqCst),
            delete: c.delete.load(Ordering::SeqCst),
            exists: c.exists.load(Ordering::SeqCst),
            get_metadata: c.get_metadata.load(Ordering::SeqCst),
            list_page: c.list_page.load(Ordering::SeqCst),
            set_metadata: c.set_metadata.load(Ordering::SeqCst),
            rename: c.rename.load(Ordering::SeqCst),
            legal_hold: c.legal_hold.load(Ordering::SeqCst),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        let c = &self.counters;
        for counter in [
            &c.upload,
            &c.open_read,
            &c.delete,
            &c.exists,
            &c.get_metadata,
            &c.list_page,
            &c.set_metadata,
            &c.rename,
            &c.legal_hold,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Per-operation counts keyed by name, for log output.
    pub fn calls_by_name(&self) -> HashMap<&'static str, u64> {
        let s = self.calls();
        HashMap::from([
            ("upload", s.upload),
            ("open_read", s.open_read),
            ("delete", s.delete),
            ("exists", s.exists),
            ("get_metadata", s.get_metadata),
            ("list_page", s.list_page),
            ("set_metadata", s.set_metadata),
            ("rename", s.rename),
            ("legal_hold", s.legal_hold),
        ])
    }

    fn bump(counter: &AtomicU64, op: &'static str, key: &str) {
        counter.fetch_add(1, Ordering::SeqCst);
        trace!(op, key, "storage call");
    }
}

#[async_trait]
impl<S: BlobStorage> BlobStorage for InstrumentedStorage<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> BlobCapabilities {
        self.inner.capabilities()
    }

    async fn upload(
        &self,
        key: &str,
        reader: BlobReader,
        options: UploadOptions,
    ) -> StorageResult<BlobMetadata> {
        Self::bump(&self.counters.upload, "upload", key);
        self.inner.upload(key, reader, options).await
    }

    async fn open_read(&self, key: &str) -> StorageResult<BlobReader> {
        Self::bump(&self.counters.open_read, "open_read", key);
        self.inner.open_read(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Self::bump(&self.counters.delete, "delete", key);
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::bump(&self.counters.exists, "exists", key);
        self.inner.exists(key).await
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        Self::bump(&self.counters.get_metadata, "get_metadata", key);
        self.inner.get_metadata(key).await
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        Self::bump(&self.counters.list_page, "list_page", prefix);
        self.inner.list_page(prefix, continuation, page_size).await
    }

    async fn set_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
        expected_etag: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        Self::bump(&self.counters.set_metadata, "set_metadata", key);
        self.inner.set_metadata(key, metadata, expected_etag).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<BlobMetadata> {
        Self::bump(&self.counters.rename, "rename", from);
        self.inner.rename(from, to).await
    }

    async fn set_legal_hold(&self, key: &str, hold: bool) -> StorageResult<()> {
        Self::bump(&self.counters.legal_hold, "set_legal_hold", key);
        self.inner.set_legal_hold(key, hold).await
    }

    async fn has_legal_hold(&self, key: &str) -> StorageResult<bool> {
        Self::bump(&self.counters.legal_hold, "has_legal_hold", key);
        self.inner.has_legal_hold(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBlobStorage, reader_from_bytes};

    #[tokio::test]
    async fn test_counts_and_reset() {
        let storage = InstrumentedStorage::new(MemoryBlobStorage::new());
        storage
            .upload("a", reader_from_bytes("x"), UploadOptions::default())
            .await
            .unwrap();
        assert!(storage.exists("a").await.unwrap());
        assert!(storage.get_metadata("a").await.unwrap().is_some());

        let calls = storage.calls();
        assert_eq!(calls.upload, 1);
        assert_eq!(calls.lookups(), 2);
        assert_eq!(calls.total(), 3);
        assert_eq!(storage.calls_by_name()["exists"], 1);

        storage.reset();
        assert_eq!(storage.calls(), CallSnapshot::default());
        assert_eq!(storage.inner().len(), 1);
    }
}
