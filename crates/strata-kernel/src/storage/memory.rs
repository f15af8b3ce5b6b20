//! In-memory blob storage.
//!
//! Used for scratch mounts and testing. All data is ephemeral.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use strata_types::BlobMetadata;

use super::{
    BlobCapabilities, BlobReader, BlobStorage, ListPage, StorageError, StorageResult,
    UploadOptions, guess_content_type, read_to_bytes, reader_from_bytes,
};

/// Default container name.
const DEFAULT_CONTAINER: &str = "memory";

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    meta: BlobMetadata,
    legal_hold: bool,
}

/// In-memory blob storage.
///
/// Keys live in a `BTreeMap` so prefix listing is a range scan. Thread-safe
/// via an internal `RwLock` that is never held across an await.
#[derive(Debug)]
pub struct MemoryBlobStorage {
    container: String,
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    capabilities: BlobCapabilities,
}

impl Default for MemoryBlobStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStorage {
    /// Create an empty store with metadata patching and legal holds.
    pub fn new() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            blobs: RwLock::new(BTreeMap::new()),
            capabilities: BlobCapabilities::none()
                .with_metadata_patch(true)
                .with_legal_hold(true),
        }
    }

    /// Use a different container name.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Override the declared capabilities.
    ///
    /// Useful for exercising the VFS fallbacks (copy-then-delete moves,
    /// rewrite-on-update metadata) against the same store.
    pub fn with_capabilities(mut self, capabilities: BlobCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    /// Keys ending in `/` are accepted as directory markers.
    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.starts_with('/') || key.contains("//") {
            return Err(StorageError::invalid_key(key));
        }
        Ok(())
    }

    fn new_etag() -> String {
        format!("\"{}\"", Uuid::new_v4().simple())
    }

    fn check_etag(key: &str, current: &BlobMetadata, expected: Option<&str>) -> StorageResult<()> {
        match expected {
            Some(expected) if current.etag.as_deref() != Some(expected) => {
                Err(StorageError::PreconditionFailed {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: current.etag.clone().unwrap_or_default(),
                })
            }
            _ => Ok(()),
        }
    }

    fn held(key: &str) -> StorageError {
        StorageError::permission_denied(format!("{} is under legal hold", key))
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> BlobCapabilities {
        self.capabilities
    }

    async fn upload(
        &self,
        key: &str,
        reader: BlobReader,
        options: UploadOptions,
    ) -> StorageResult<BlobMetadata> {
        Self::validate_key(key)?;
        let data = read_to_bytes(reader).await?;

        let now = Utc::now();
        let meta = BlobMetadata::new(&self.container, key)
            .with_uri(format!("memory://{}/{}", self.container, key))
            .with_length(data.len() as u64)
            .with_content_type(
                options
                    .content_type
                    .unwrap_or_else(|| guess_content_type(key)),
            )
            .with_times(now, now)
            .with_etag(Self::new_etag())
            .with_metadata(options.metadata);

        let mut blobs = self.blobs.write();
        if blobs.get(key).is_some_and(|b| b.legal_hold) {
            return Err(Self::held(key));
        }
        blobs.insert(
            key.to_string(),
            StoredBlob {
                data,
                meta: meta.clone(),
                legal_hold: false,
            },
        );
        trace!(key, length = meta.length, "memory upload");
        Ok(meta)
    }

    async fn open_read(&self, key: &str) -> StorageResult<BlobReader> {
        let blobs = self.blobs.read();
        blobs
            .get(key)
            .map(|b| reader_from_bytes(b.data.clone()))
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut blobs = self.blobs.write();
        match blobs.get(key).map(|b| b.legal_hold) {
            Some(true) => Err(Self::held(key)),
            Some(false) => Ok(blobs.remove(key).is_some()),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        Ok(self.blobs.read().get(key).map(|b| b.meta.clone()))
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        let page_size = page_size.max(1);
        let blobs = self.blobs.read();

        let start = match continuation {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut items: Vec<BlobMetadata> = blobs
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(page_size + 1)
            .map(|(_, blob)| blob.meta.clone())
            .collect();

        let continuation = if items.len() > page_size {
            items.truncate(page_size);
            items.last().map(|b| b.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            items,
            continuation,
        })
    }

    async fn set_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
        expected_etag: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        if !self.capabilities.metadata_patch {
            return Err(StorageError::unsupported("metadata patch"));
        }
        let mut blobs = self.blobs.write();
        let blob = blobs
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found(key))?;
        Self::check_etag(key, &blob.meta, expected_etag)?;

        blob.meta.metadata = metadata;
        blob.meta.modified = Utc::now();
        blob.meta.etag = Some(Self::new_etag());
        Ok(blob.meta.clone())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<BlobMetadata> {
        if !self.capabilities.native_rename {
            return Err(StorageError::unsupported("native rename"));
        }
        Self::validate_key(to)?;
        let mut blobs = self.blobs.write();
        if blobs.get(to).is_some_and(|b| b.legal_hold) {
            return Err(Self::held(to));
        }
        if blobs.get(from).is_some_and(|b| b.legal_hold) {
            return Err(Self::held(from));
        }
        let mut blob = blobs
            .remove(from)
            .ok_or_else(|| StorageError::not_found(from))?;

        blob.meta.key = to.to_string();
        blob.meta.name = to.rsplit('/').next().unwrap_or(to).to_string();
        blob.meta.uri = format!("memory://{}/{}", self.container, to);
        blob.meta.modified = Utc::now();
        let meta = blob.meta.clone();
        blobs.insert(to.to_string(), blob);
        Ok(meta)
    }

    async fn set_legal_hold(&self, key: &str, hold: bool) -> StorageResult<()> {
        if !self.capabilities.legal_hold {
            return Err(StorageError::unsupported("legal hold"));
        }
        let mut blobs = self.blobs.write();
        let blob = blobs
            .get_mut(key)
            .ok_or_else(|| StorageError::not_found(key))?;
        blob.legal_hold = hold;
        Ok(())
    }

    async fn has_legal_hold(&self, key: &str) -> StorageResult<bool> {
        if !self.capabilities.legal_hold {
            return Err(StorageError::unsupported("legal hold"));
        }
        self.blobs
            .read()
            .get(key)
            .map(|b| b.legal_hold)
            .ok_or_else(|| StorageError::not_found(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn put(store: &MemoryBlobStorage, key: &str, data: &'static [u8]) -> BlobMetadata {
        store
            .upload(key, reader_from_bytes(data), UploadOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_and_read() {
        let store = MemoryBlobStorage::new();
        let meta = put(&store, "docs/hello.txt", b"hello").await;
        assert_eq!(meta.length, 5);
        assert_eq!(meta.name, "hello.txt");
        assert_eq!(meta.content_type, "text/plain");
        assert!(meta.etag.is_some());

        let data = read_to_bytes(store.open_read("docs/hello.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let store = MemoryBlobStorage::new();
        for key in ["", "/abs", "a//b"] {
            let result = store
                .upload(key, reader_from_bytes("x"), UploadOptions::default())
                .await;
            assert!(matches!(result, Err(StorageError::InvalidKey(_))), "{key}");
        }
    }

    #[tokio::test]
    async fn test_list_page_continuation() {
        let store = MemoryBlobStorage::new();
        for key in ["a/1", "a/2", "a/3", "b/1"] {
            put(&store, key, b"x").await;
        }

        let first = store.list_page("a/", None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.continuation.as_deref(), Some("a/2"));

        let second = store
            .list_page("a/", first.continuation.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].key, "a/3");
        assert!(second.continuation.is_none());
    }

    #[tokio::test]
    async fn test_set_metadata_with_etag() {
        let store = MemoryBlobStorage::new();
        let meta = put(&store, "k", b"x").await;

        let stale = store
            .set_metadata("k", HashMap::new(), Some("\"nope\""))
            .await;
        assert!(matches!(stale, Err(StorageError::PreconditionFailed { .. })));

        let mut bag = HashMap::new();
        bag.insert("a".to_string(), "b".to_string());
        let updated = store
            .set_metadata("k", bag, meta.etag.as_deref())
            .await
            .unwrap();
        assert_eq!(updated.metadata.get("a").map(String::as_str), Some("b"));
        assert_ne!(updated.etag, meta.etag);
    }

    #[tokio::test]
    async fn test_legal_hold_blocks_delete_and_overwrite() {
        let store = MemoryBlobStorage::new();
        put(&store, "held.txt", b"x").await;
        store.set_legal_hold("held.txt", true).await.unwrap();
        assert!(store.has_legal_hold("held.txt").await.unwrap());

        assert!(matches!(
            store.delete("held.txt").await,
            Err(StorageError::PermissionDenied(_))
        ));
        let overwrite = store
            .upload("held.txt", reader_from_bytes("y"), UploadOptions::default())
            .await;
        assert!(matches!(overwrite, Err(StorageError::PermissionDenied(_))));

        store.set_legal_hold("held.txt", false).await.unwrap();
        assert!(store.delete("held.txt").await.unwrap());
        assert!(!store.delete("held.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_requires_capability() {
        let store = MemoryBlobStorage::new();
        put(&store, "a.txt", b"x").await;
        assert!(matches!(
            store.rename("a.txt", "b.txt").await,
            Err(StorageError::Unsupported(_))
        ));

        let store = MemoryBlobStorage::new()
            .with_capabilities(BlobCapabilities::none().with_native_rename(true));
        put(&store, "a.txt", b"x").await;
        let moved = store.rename("a.txt", "dir/b.txt").await.unwrap();
        assert_eq!(moved.key, "dir/b.txt");
        assert_eq!(moved.name, "b.txt");
        assert_eq!(store.keys(), vec!["dir/b.txt".to_string()]);
    }
}
