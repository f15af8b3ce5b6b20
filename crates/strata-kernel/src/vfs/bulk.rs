//! Copy, move and directory delete.
//!
//! Each operation snapshots the affected keys with a prefix scan, then works
//! through them with at most `concurrency` backend calls in flight. A failed
//! item is recorded and the rest carry on. With `fail_fast` the first failure
//! stops new items from starting and is returned once the running ones have
//! settled. After cancellation no new item starts; items already running
//! finish and are counted.
//!
//! Directory markers (keys ending in `/`) travel with copies and moves so
//! empty directories survive, but they are never counted as files.
//!
//! Single-file copies and moves are not bulk operations: they return the
//! specific error instead of a report with one failure.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_types::{BlobMetadata, VfsPath};

use crate::cache::MetadataCache;
use crate::error::{VfsError, VfsResult};
use crate::storage::{BlobStorage, UploadOptions, list_blobs};

use super::Vfs;
use super::listing::next_blob;

// ============================================================================
// Options and reports
// ============================================================================

/// Options for directory delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    /// Maximum in-flight deletes; the VFS default when `None`.
    pub concurrency: Option<usize>,
    /// Return the first failure as an error.
    pub fail_fast: bool,
}

impl BulkOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }
}

/// Options for [`Vfs::copy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Copy the whole subtree, not just direct children.
    pub recursive: bool,
    /// Replace existing destination files.
    pub overwrite: bool,
    pub concurrency: Option<usize>,
    pub fail_fast: bool,
}

impl CopyOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }
}

/// Options for [`Vfs::move_path`]. Directory moves are always recursive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOptions {
    pub overwrite: bool,
    pub concurrency: Option<usize>,
    pub fail_fast: bool,
}

impl MoveOptions {
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }
}

/// One item that failed during a bulk operation.
#[derive(Debug)]
pub struct BulkFailure {
    pub path: VfsPath,
    pub error: VfsError,
}

impl BulkFailure {
    pub fn new(path: VfsPath, error: VfsError) -> Self {
        Self { path, error }
    }
}

/// Result of a directory delete.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub files_deleted: u64,
    pub failures: Vec<BulkFailure>,
    /// Cancellation stopped items from starting.
    pub cancelled: bool,
}

impl DeleteReport {
    /// No failures and nothing skipped.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Result of a copy or move.
#[derive(Debug, Default)]
pub struct TransferReport {
    pub files_copied: u64,
    pub bytes_copied: u64,
    /// Sources removed (moves only).
    pub files_removed: u64,
    pub failures: Vec<BulkFailure>,
    pub cancelled: bool,
}

impl TransferReport {
    fn single(bytes: u64, removed: bool) -> Self {
        Self {
            files_copied: 1,
            bytes_copied: bytes,
            files_removed: u64::from(removed),
            ..Self::default()
        }
    }

    /// No failures and nothing skipped.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

// ============================================================================
// Runner
// ============================================================================

struct BulkOutcome<T> {
    done: Vec<T>,
    failures: Vec<BulkFailure>,
    cancelled: bool,
}

/// Run `op` over `items` with bounded concurrency.
///
/// The token is checked as each item is about to start, never mid-item. A
/// fail-fast stop works the same way: items already started always run to
/// completion so their cache invalidation happens before the error returns.
async fn run_bulk<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    fail_fast: bool,
    cancel: &CancellationToken,
    op: F,
) -> VfsResult<BulkOutcome<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, BulkFailure>>,
{
    let halted = AtomicBool::new(false);
    let halted = &halted;
    let mut results = stream::iter(items)
        .map(|item| {
            let cancel = cancel.clone();
            let fut = op(item);
            async move {
                if halted.load(Ordering::Acquire) {
                    return ItemResult::Skipped;
                }
                if cancel.is_cancelled() {
                    return ItemResult::Cancelled;
                }
                ItemResult::Ran(fut.await)
            }
        })
        .buffer_unordered(concurrency);

    let mut outcome = BulkOutcome {
        done: Vec::new(),
        failures: Vec::new(),
        cancelled: false,
    };
    let mut first_error = None;

    while let Some(result) = results.next().await {
        match result {
            ItemResult::Skipped => {}
            ItemResult::Cancelled => outcome.cancelled = true,
            ItemResult::Ran(Ok(value)) => outcome.done.push(value),
            ItemResult::Ran(Err(failure)) => {
                warn!(path = %failure.path, error = %failure.error, "bulk item failed");
                if fail_fast && first_error.is_none() {
                    halted.store(true, Ordering::Release);
                    first_error = Some(failure.error);
                } else {
                    outcome.failures.push(failure);
                }
            }
        }
    }

    debug!(
        done = outcome.done.len(),
        failed = outcome.failures.len(),
        cancelled = outcome.cancelled,
        halted = first_error.is_some(),
        "bulk run finished"
    );
    match first_error {
        Some(error) => Err(error),
        None => Ok(outcome),
    }
}

enum ItemResult<T> {
    Ran(Result<T, BulkFailure>),
    Cancelled,
    Skipped,
}

fn is_marker_key(key: &str) -> bool {
    key.is_empty() || key.ends_with('/')
}

/// Blobs under `dir`: direct children, or the whole subtree.
async fn snapshot(
    vfs: &Vfs,
    dir: &VfsPath,
    recursive: bool,
    include_markers: bool,
    cancel: &CancellationToken,
) -> VfsResult<Vec<BlobMetadata>> {
    let prefix = dir.to_prefix();
    let mut blobs = list_blobs(vfs.storage().clone(), prefix.clone(), vfs.options().page_size);
    let mut found = Vec::new();

    while let Some(blob) = next_blob(&mut blobs, cancel).await? {
        let Some(relative) = blob.key.strip_prefix(&prefix) else {
            continue;
        };
        let is_marker = relative.is_empty() || relative.ends_with('/');
        if is_marker && !include_markers {
            continue;
        }
        if !recursive && relative.trim_end_matches('/').contains('/') {
            continue;
        }
        found.push(blob);
    }
    Ok(found)
}

fn check_transfer(source: &VfsPath, destination: &VfsPath) -> VfsResult<()> {
    if source.is_root() {
        return Err(VfsError::invalid_path("cannot transfer the root directory"));
    }
    if destination.is_root() {
        return Err(VfsError::invalid_path("destination cannot be the root"));
    }
    if destination.starts_with(source) {
        return Err(VfsError::invalid_path(format!(
            "{destination} is inside {source}"
        )));
    }
    Ok(())
}

// ============================================================================
// Per-blob work
// ============================================================================

/// Copy one blob, keeping content type and the metadata bag.
async fn copy_blob(
    storage: &Arc<dyn BlobStorage>,
    cache: &MetadataCache,
    source: &BlobMetadata,
    destination: &str,
    overwrite: bool,
) -> VfsResult<u64> {
    if !overwrite && !is_marker_key(destination) && storage.exists(destination).await? {
        return Err(VfsError::conflict(format!(
            "destination exists: {}",
            VfsPath::from_key(destination)
        )));
    }

    let reader = storage.open_read(&source.key).await?;
    let options = UploadOptions::default()
        .with_content_type(source.content_type.clone())
        .with_metadata(source.metadata.clone());
    let written = storage.upload(destination, reader, options).await;
    cache.invalidate(&VfsPath::from_key(destination));
    Ok(written?.length)
}

/// Move one blob: native rename when available, else copy then delete.
async fn move_blob(
    storage: &Arc<dyn BlobStorage>,
    cache: &MetadataCache,
    source: &BlobMetadata,
    destination: &str,
    overwrite: bool,
) -> VfsResult<u64> {
    let source_path = VfsPath::from_key(&source.key);

    if storage.capabilities().native_rename {
        if !overwrite && !is_marker_key(destination) && storage.exists(destination).await? {
            return Err(VfsError::conflict(format!(
                "destination exists: {}",
                VfsPath::from_key(destination)
            )));
        }
        let renamed = storage.rename(&source.key, destination).await;
        cache.invalidate(&source_path);
        cache.invalidate(&VfsPath::from_key(destination));
        return Ok(renamed?.length);
    }

    let bytes = copy_blob(storage, cache, source, destination, overwrite).await?;
    let deleted = storage.delete(&source.key).await;
    cache.invalidate(&source_path);
    if let Err(e) = deleted {
        warn!(source = %source_path, destination, "copied but source not removed");
        return Err(e.into());
    }

    if storage.exists(&source.key).await? {
        return Err(VfsError::other(format!(
            "source {source_path} still present after move"
        )));
    }
    Ok(bytes)
}

// ============================================================================
// Operations
// ============================================================================

#[tracing::instrument(skip(vfs, options, cancel), fields(vfs = %vfs.id()))]
pub(super) async fn delete_directory(
    vfs: &Vfs,
    dir: &VfsPath,
    recursive: bool,
    options: BulkOptions,
    cancel: &CancellationToken,
) -> VfsResult<DeleteReport> {
    vfs.enter_writable()?;
    let blobs = snapshot(vfs, dir, recursive, recursive, cancel).await?;
    let storage = vfs.storage().clone();
    let cache = vfs.cache().clone();

    let outcome = run_bulk(
        blobs,
        vfs.concurrency(options.concurrency),
        options.fail_fast,
        cancel,
        |blob| {
            let storage = storage.clone();
            let cache = cache.clone();
            async move {
                let path = VfsPath::from_key(&blob.key);
                let result = storage.delete(&blob.key).await;
                cache.invalidate(&path);
                result
                    .map(|removed| removed && !is_marker_key(&blob.key))
                    .map_err(|e| BulkFailure::new(path, e.into()))
            }
        },
    )
    .await;
    if recursive {
        vfs.cache().invalidate_prefix(dir);
    }
    let outcome = outcome?;

    let report = DeleteReport {
        files_deleted: outcome.done.iter().filter(|counted| **counted).count() as u64,
        failures: outcome.failures,
        cancelled: outcome.cancelled,
    };
    info!(
        deleted = report.files_deleted,
        failed = report.failures.len(),
        cancelled = report.cancelled,
        "directory delete finished"
    );
    Ok(report)
}

#[tracing::instrument(skip(vfs, options, cancel), fields(vfs = %vfs.id()))]
pub(super) async fn copy(
    vfs: &Vfs,
    source: &VfsPath,
    destination: &VfsPath,
    options: CopyOptions,
    cancel: &CancellationToken,
) -> VfsResult<TransferReport> {
    vfs.enter_writable()?;
    check_transfer(source, destination)?;
    let storage = vfs.storage().clone();
    let cache = vfs.cache().clone();

    if let Some(blob) = vfs.metadata().get_blob_info(source, cancel).await? {
        let target = destination.to_key();
        let bytes = copy_blob(&storage, &cache, &blob, &target, options.overwrite).await?;
        return Ok(TransferReport::single(bytes, false));
    }
    if !vfs.directory_exists(source, cancel).await? {
        return Err(VfsError::not_found(source.as_str()));
    }

    let blobs = snapshot(vfs, source, options.recursive, true, cancel).await?;
    let pairs = transfer_pairs(blobs, source, destination);
    let overwrite = options.overwrite;
    let outcome = run_bulk(
        pairs,
        vfs.concurrency(options.concurrency),
        options.fail_fast,
        cancel,
        |(blob, target)| {
            let storage = storage.clone();
            let cache = cache.clone();
            async move {
                copy_blob(&storage, &cache, &blob, &target, overwrite)
                    .await
                    .map(|bytes| (!is_marker_key(&target)).then_some(bytes))
                    .map_err(|e| BulkFailure::new(VfsPath::from_key(&blob.key), e))
            }
        },
    )
    .await;
    cache.invalidate_prefix(destination);
    let outcome = outcome?;

    let report = TransferReport {
        files_copied: outcome.done.iter().flatten().count() as u64,
        bytes_copied: outcome.done.iter().flatten().sum(),
        files_removed: 0,
        failures: outcome.failures,
        cancelled: outcome.cancelled,
    };
    info!(
        copied = report.files_copied,
        bytes = report.bytes_copied,
        failed = report.failures.len(),
        "copy finished"
    );
    Ok(report)
}

#[tracing::instrument(skip(vfs, options, cancel), fields(vfs = %vfs.id()))]
pub(super) async fn move_path(
    vfs: &Vfs,
    source: &VfsPath,
    destination: &VfsPath,
    options: MoveOptions,
    cancel: &CancellationToken,
) -> VfsResult<TransferReport> {
    vfs.enter_writable()?;
    check_transfer(source, destination)?;
    let storage = vfs.storage().clone();
    let cache = vfs.cache().clone();

    if let Some(blob) = vfs.metadata().get_blob_info(source, cancel).await? {
        let target = destination.to_key();
        let bytes = move_blob(&storage, &cache, &blob, &target, options.overwrite).await?;
        return Ok(TransferReport::single(bytes, true));
    }
    if !vfs.directory_exists(source, cancel).await? {
        return Err(VfsError::not_found(source.as_str()));
    }

    let blobs = snapshot(vfs, source, true, true, cancel).await?;
    let pairs = transfer_pairs(blobs, source, destination);
    let overwrite = options.overwrite;
    let outcome = run_bulk(
        pairs,
        vfs.concurrency(options.concurrency),
        options.fail_fast,
        cancel,
        |(blob, target)| {
            let storage = storage.clone();
            let cache = cache.clone();
            async move {
                move_blob(&storage, &cache, &blob, &target, overwrite)
                    .await
                    .map(|bytes| (!is_marker_key(&target)).then_some(bytes))
                    .map_err(|e| BulkFailure::new(VfsPath::from_key(&blob.key), e))
            }
        },
    )
    .await;
    cache.invalidate_prefix(source);
    cache.invalidate_prefix(destination);
    let outcome = outcome?;

    let moved = outcome.done.iter().flatten().count() as u64;
    let report = TransferReport {
        files_copied: moved,
        bytes_copied: outcome.done.iter().flatten().sum(),
        files_removed: moved,
        failures: outcome.failures,
        cancelled: outcome.cancelled,
    };
    info!(
        moved = report.files_copied,
        failed = report.failures.len(),
        cancelled = report.cancelled,
        "move finished"
    );
    Ok(report)
}

/// Pair each source blob with its key under `destination`.
///
/// Markers keep their trailing `/`.
fn transfer_pairs(
    blobs: Vec<BlobMetadata>,
    source: &VfsPath,
    destination: &VfsPath,
) -> Vec<(BlobMetadata, String)> {
    blobs
        .into_iter()
        .filter_map(|blob| {
            let target = VfsPath::from_key(&blob.key).rebase(source, destination)?;
            let mut key = target.to_key();
            if is_marker_key(&blob.key) {
                key.push('/');
            }
            Some((blob, key))
        })
        .collect()
}
