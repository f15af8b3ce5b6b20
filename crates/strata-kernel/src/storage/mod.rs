//! The blob-storage contract.
//!
//! Every backend adapter implements [`BlobStorage`]: flat key-space CRUD plus
//! paged prefix listing. Nothing here knows about directories; the VFS builds
//! those on top from key prefixes alone.
//!
//! Optional features (in-place metadata patching, native rename, legal holds)
//! are declared through [`BlobCapabilities`] and checked at runtime. Their
//! trait methods default to [`StorageError::Unsupported`].

mod error;
mod instrumented;
mod local;
mod memory;

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use strata_types::BlobMetadata;

pub use error::{StorageError, StorageResult};
pub use instrumented::{CallSnapshot, InstrumentedStorage};
pub use local::LocalBlobStorage;
pub use memory::MemoryBlobStorage;

/// Readable blob content.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap in-memory bytes as a [`BlobReader`].
pub fn reader_from_bytes(data: impl Into<Bytes>) -> BlobReader {
    Box::pin(std::io::Cursor::new(data.into()))
}

/// Drain a [`BlobReader`] into memory.
pub async fn read_to_bytes(mut reader: BlobReader) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Optional features a backend declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobCapabilities {
    /// `set_metadata` patches the metadata bag without rewriting content.
    pub metadata_patch: bool,
    /// `rename` moves a blob atomically.
    pub native_rename: bool,
    /// `set_legal_hold` / `has_legal_hold` are available.
    pub legal_hold: bool,
}

impl BlobCapabilities {
    /// No optional features.
    pub fn none() -> Self {
        Self::default()
    }

    /// Declare in-place metadata patching.
    pub fn with_metadata_patch(mut self, enabled: bool) -> Self {
        self.metadata_patch = enabled;
        self
    }

    /// Declare native rename.
    pub fn with_native_rename(mut self, enabled: bool) -> Self {
        self.native_rename = enabled;
        self
    }

    /// Declare legal-hold support.
    pub fn with_legal_hold(mut self, enabled: bool) -> Self {
        self.legal_hold = enabled;
        self
    }
}

/// Upload parameters.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// MIME type; the backend picks a default when absent.
    pub content_type: Option<String>,
    /// Raw metadata bag stored with the blob.
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the metadata bag.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Blobs in key order.
    pub items: Vec<BlobMetadata>,
    /// Token for the next page; `None` when the listing is exhausted.
    pub continuation: Option<String>,
}

/// Flat key/blob storage.
///
/// Keys are `/`-separated strings without a leading slash. Implementations
/// must be safe to call concurrently.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Short backend name for logs and mount listings.
    fn name(&self) -> &str;

    /// Optional features this backend supports.
    fn capabilities(&self) -> BlobCapabilities {
        BlobCapabilities::none()
    }

    /// Store `reader`'s content under `key`, replacing any existing blob.
    async fn upload(
        &self,
        key: &str,
        reader: BlobReader,
        options: UploadOptions,
    ) -> StorageResult<BlobMetadata>;

    /// Open the content of `key` for reading.
    async fn open_read(&self, key: &str) -> StorageResult<BlobReader>;

    /// Delete `key`. Returns false if nothing was there.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check whether `key` exists.
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get_metadata(key).await?.is_some())
    }

    /// Metadata for `key`, or `None` if absent.
    async fn get_metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>>;

    /// One page of blobs whose keys start with `prefix`, in key order.
    ///
    /// `continuation` is the token from the previous page.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> StorageResult<ListPage>;

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    /// Replace the metadata bag of `key` without rewriting content.
    ///
    /// When `expected_etag` is given the update only applies if it matches.
    async fn set_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
        expected_etag: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        let _ = (key, metadata, expected_etag);
        Err(StorageError::unsupported("metadata patch"))
    }

    /// Atomically move `from` to `to`, replacing any blob at `to`.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<BlobMetadata> {
        let _ = (from, to);
        Err(StorageError::unsupported("native rename"))
    }

    /// Place or release a legal hold on `key`.
    async fn set_legal_hold(&self, key: &str, hold: bool) -> StorageResult<()> {
        let _ = (key, hold);
        Err(StorageError::unsupported("legal hold"))
    }

    /// Whether `key` is under legal hold.
    async fn has_legal_hold(&self, key: &str) -> StorageResult<bool> {
        let _ = key;
        Err(StorageError::unsupported("legal hold"))
    }
}

/// Stream every blob under `prefix`, fetching pages of `page_size` lazily.
///
/// Single pass: dropping the stream stops further page fetches.
pub fn list_blobs(
    storage: Arc<dyn BlobStorage>,
    prefix: String,
    page_size: usize,
) -> BoxStream<'static, StorageResult<BlobMetadata>> {
    struct Pager {
        storage: Arc<dyn BlobStorage>,
        prefix: String,
        page_size: usize,
        continuation: Option<String>,
        buffer: VecDeque<BlobMetadata>,
        exhausted: bool,
    }

    let pager = Pager {
        storage,
        prefix,
        page_size: page_size.max(1),
        continuation: None,
        buffer: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(pager, |mut pager| async move {
        loop {
            if let Some(item) = pager.buffer.pop_front() {
                return Ok(Some((item, pager)));
            }
            if pager.exhausted {
                return Ok(None);
            }

            let page = pager
                .storage
                .list_page(&pager.prefix, pager.continuation.as_deref(), pager.page_size)
                .await?;

            match page.continuation {
                Some(next) if pager.continuation.as_deref() == Some(next.as_str()) => {
                    return Err(StorageError::backend(format!(
                        "listing of '{}' did not advance past '{}'",
                        pager.prefix, next
                    )));
                }
                Some(next) => pager.continuation = Some(next),
                None => pager.exhausted = true,
            }
            pager.buffer.extend(page.items);
        }
    })
    .boxed()
}

/// Guess a MIME type from a key's extension.
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(strata_types::DEFAULT_CONTENT_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_list_blobs_walks_all_pages() {
        let storage = Arc::new(MemoryBlobStorage::new());
        for i in 0..7 {
            storage
                .upload(
                    &format!("dir/file-{i}.txt"),
                    reader_from_bytes(vec![i as u8]),
                    UploadOptions::default(),
                )
                .await
                .unwrap();
        }
        storage
            .upload("other/x.txt", reader_from_bytes("x"), UploadOptions::default())
            .await
            .unwrap();

        let keys: Vec<String> = list_blobs(storage, "dir/".to_string(), 3)
            .map_ok(|b| b.key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys.len(), 7);
        assert!(keys.iter().all(|k| k.starts_with("dir/")));
    }

    #[tokio::test]
    async fn test_default_capabilities_are_unsupported() {
        struct Bare;

        #[async_trait]
        impl BlobStorage for Bare {
            fn name(&self) -> &str {
                "bare"
            }
            async fn upload(
                &self,
                key: &str,
                _reader: BlobReader,
                _options: UploadOptions,
            ) -> StorageResult<BlobMetadata> {
                Ok(BlobMetadata::new("bare", key))
            }
            async fn open_read(&self, key: &str) -> StorageResult<BlobReader> {
                Err(StorageError::not_found(key))
            }
            async fn delete(&self, _key: &str) -> StorageResult<bool> {
                Ok(false)
            }
            async fn get_metadata(&self, _key: &str) -> StorageResult<Option<BlobMetadata>> {
                Ok(None)
            }
            async fn list_page(
                &self,
                _prefix: &str,
                _continuation: Option<&str>,
                _page_size: usize,
            ) -> StorageResult<ListPage> {
                Ok(ListPage::default())
            }
        }

        let bare = Bare;
        assert_eq!(bare.capabilities(), BlobCapabilities::none());
        assert!(matches!(
            bare.rename("a", "b").await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            bare.set_legal_hold("a", true).await,
            Err(StorageError::Unsupported(_))
        ));
        assert!(!bare.exists("a").await.unwrap());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("docs/a.txt"), "text/plain");
        assert_eq!(guess_content_type("img/p.png"), "image/png");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
