//! The virtual filesystem over one blob store.
//!
//! A [`Vfs`] turns a flat key-space into a tree. Nothing is stored besides
//! the blobs themselves: directories are key prefixes, listing is a prefix
//! scan, and directory operations fan out over the keys they find.
//!
//! - [`VfsFile`] - handle for one path: content, metadata, legal hold
//! - [`VfsDirectory`] - handle for a prefix: listing, stats, delete
//! - bulk operations - copy, move, recursive delete with bounded concurrency
//!
//! ## Lifecycle
//!
//! `Created → Serving → Disposed`. The first operation moves a VFS to
//! `Serving`; [`Vfs::dispose`] is terminal and every later call, including
//! through handles obtained earlier, fails with [`VfsError::Disposed`].
//!
//! ## Cancellation
//!
//! Operations take a [`CancellationToken`] and check it before each backend
//! call. Bulk operations never start a new item after it fires but let
//! in-flight items finish, so reports count exactly what was applied.

mod bulk;
mod directory;
mod file;
mod listing;
mod stats;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::stream::BoxStream;
use serde::Serialize;
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use strata_types::{DirectoryStats, VfsNode, VfsPath};

use crate::cache::{CacheStats, MetadataCache};
use crate::config::{DEFAULT_METADATA_PREFIX, VfsOptions};
use crate::error::{VfsError, VfsResult, cancellable};
use crate::metadata::{MetadataCodec, MetadataManager};
use crate::storage::{BlobCapabilities, BlobStorage};

pub use bulk::{BulkFailure, BulkOptions, CopyOptions, DeleteReport, MoveOptions, TransferReport};
pub use directory::VfsDirectory;
pub use file::VfsFile;
pub use listing::ListOptions;

/// Lifecycle state of a [`Vfs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VfsState {
    Created,
    Serving,
    Disposed,
}

impl VfsState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Serving,
            _ => Self::Disposed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Serving => 1,
            Self::Disposed => 2,
        }
    }
}

struct VfsInner {
    id: Uuid,
    storage: Arc<dyn BlobStorage>,
    options: VfsOptions,
    cache: Arc<MetadataCache>,
    metadata: MetadataManager,
    state: AtomicU8,
}

/// A virtual filesystem over one blob store.
///
/// Cheap to clone; clones share the cache and lifecycle.
#[derive(Clone)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("id", &self.inner.id)
            .field("storage", &self.inner.storage.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Vfs {
    /// Build a VFS with its own cache and metadata manager.
    ///
    /// Out-of-range options are clamped; an empty metadata prefix falls back
    /// to [`DEFAULT_METADATA_PREFIX`].
    pub fn new(storage: Arc<dyn BlobStorage>, mut options: VfsOptions) -> Self {
        options.page_size = options.page_size.max(1);
        options.bulk_concurrency = options.bulk_concurrency.max(1);
        if options.metadata_prefix.is_empty() {
            warn!(
                fallback = DEFAULT_METADATA_PREFIX,
                "empty metadata prefix would claim every metadata key"
            );
            options.metadata_prefix = DEFAULT_METADATA_PREFIX.to_string();
        }

        let cache = Arc::new(MetadataCache::new(options.cache_enabled));
        let metadata = MetadataManager::new(
            storage.clone(),
            cache.clone(),
            MetadataCodec::new(options.metadata_prefix.clone()),
            options.rewrite_on_metadata_update,
        );

        Self {
            inner: Arc::new(VfsInner {
                id: Uuid::new_v4(),
                storage,
                options,
                cache,
                metadata,
                state: AtomicU8::new(VfsState::Created.as_u8()),
            }),
        }
    }

    /// Unique id, for logs.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn storage(&self) -> &Arc<dyn BlobStorage> {
        &self.inner.storage
    }

    pub fn options(&self) -> &VfsOptions {
        &self.inner.options
    }

    pub fn capabilities(&self) -> BlobCapabilities {
        self.inner.storage.capabilities()
    }

    pub fn state(&self) -> VfsState {
        VfsState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == VfsState::Disposed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub(crate) fn cache(&self) -> &Arc<MetadataCache> {
        &self.inner.cache
    }

    pub(crate) fn metadata(&self) -> &MetadataManager {
        &self.inner.metadata
    }

    /// Gate every operation: fail once disposed, start serving on first use.
    pub(crate) fn enter(&self) -> VfsResult<()> {
        let state = &self.inner.state;
        match VfsState::from_u8(state.load(Ordering::SeqCst)) {
            VfsState::Disposed => Err(VfsError::Disposed),
            VfsState::Serving => Ok(()),
            VfsState::Created => {
                // Losing the race to another first caller or to dispose is fine;
                // re-read the state either way.
                let _ = state.compare_exchange(
                    VfsState::Created.as_u8(),
                    VfsState::Serving.as_u8(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                if self.is_disposed() {
                    Err(VfsError::Disposed)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// [`enter`](Self::enter), then reject mutations on a read-only VFS.
    pub(crate) fn enter_writable(&self) -> VfsResult<()> {
        self.enter()?;
        if self.inner.options.read_only {
            return Err(VfsError::ReadOnly);
        }
        Ok(())
    }

    /// Concurrency for a bulk call, honouring a per-call override.
    pub(crate) fn concurrency(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.inner.options.bulk_concurrency)
            .max(1)
    }

    /// Tear down. Returns false if already disposed.
    pub fn dispose(&self) -> bool {
        let previous = self
            .inner
            .state
            .swap(VfsState::Disposed.as_u8(), Ordering::SeqCst);
        if VfsState::from_u8(previous) == VfsState::Disposed {
            return false;
        }
        self.inner.cache.clear();
        info!(vfs = %self.inner.id, storage = self.inner.storage.name(), "vfs disposed");
        true
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Handle for the file at `path`. The file need not exist.
    pub fn file(&self, path: impl Into<VfsPath>) -> VfsFile {
        VfsFile::new(self.clone(), path.into())
    }

    /// Handle for the directory at `path`.
    pub fn directory(&self, path: impl Into<VfsPath>) -> VfsDirectory {
        VfsDirectory::new(self.clone(), path.into())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether a blob exists at `path`. Cached.
    pub async fn file_exists(
        &self,
        path: impl Into<VfsPath>,
        cancel: &CancellationToken,
    ) -> VfsResult<bool> {
        self.enter()?;
        let path = path.into();
        if path.is_root() {
            return Ok(false);
        }
        self.inner.metadata.exists(&path, cancel).await
    }

    /// Whether any blob exists beneath `path`. The root always exists.
    pub async fn directory_exists(
        &self,
        path: impl Into<VfsPath>,
        cancel: &CancellationToken,
    ) -> VfsResult<bool> {
        self.enter()?;
        let path = path.into();
        if path.is_root() {
            return Ok(true);
        }
        let page = cancellable(
            cancel,
            self.inner.storage.list_page(&path.to_prefix(), None, 1),
        )
        .await?;
        Ok(!page.items.is_empty())
    }

    /// Stream the entries under `path`.
    ///
    /// The stream is lazy and single-pass; pages are fetched as it is polled.
    pub fn list(
        &self,
        path: impl Into<VfsPath>,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, VfsResult<VfsNode>> {
        listing::list(self.clone(), path.into(), options, cancel.clone())
    }

    /// Aggregate count, size, extensions and newest change under `path`.
    pub async fn directory_stats(
        &self,
        path: impl Into<VfsPath>,
        cancel: &CancellationToken,
    ) -> VfsResult<DirectoryStats> {
        stats::directory_stats(self, &path.into(), cancel).await
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Delete the files under `path`: only direct children unless `recursive`.
    pub async fn delete_directory(
        &self,
        path: impl Into<VfsPath>,
        recursive: bool,
        options: BulkOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<DeleteReport> {
        bulk::delete_directory(self, &path.into(), recursive, options, cancel).await
    }

    /// Copy a file, or a directory's files, from `source` to `destination`.
    pub async fn copy(
        &self,
        source: impl Into<VfsPath>,
        destination: impl Into<VfsPath>,
        options: CopyOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        bulk::copy(self, &source.into(), &destination.into(), options, cancel).await
    }

    /// Move a file or a whole directory.
    pub async fn move_path(
        &self,
        source: impl Into<VfsPath>,
        destination: impl Into<VfsPath>,
        options: MoveOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        bulk::move_path(self, &source.into(), &destination.into(), options, cancel).await
    }
}
