//! File handles.

use std::collections::HashMap;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use strata_types::{BlobMetadata, FileAttributes, VFS_METADATA_VERSION, VfsMetadata, VfsPath};

use crate::error::{VfsError, VfsResult, cancellable};
use crate::storage::{
    BlobReader, UploadOptions, guess_content_type, read_to_bytes, reader_from_bytes,
};

use super::{CopyOptions, MoveOptions, TransferReport, Vfs};

/// Handle for one file path.
///
/// Holding a handle does not imply the file exists. Every call goes through
/// the owning [`Vfs`], so a handle outliving `dispose` fails with `Disposed`.
#[derive(Debug, Clone)]
pub struct VfsFile {
    vfs: Vfs,
    path: VfsPath,
}

impl VfsFile {
    pub(crate) fn new(vfs: Vfs, path: VfsPath) -> Self {
        Self { vfs, path }
    }

    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    fn key(&self) -> VfsResult<String> {
        if self.path.is_root() {
            return Err(VfsError::invalid_path("the root is not a file"));
        }
        Ok(self.path.to_key())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn exists(&self, cancel: &CancellationToken) -> VfsResult<bool> {
        self.vfs.enter()?;
        if self.path.is_root() {
            return Ok(false);
        }
        self.vfs.metadata().exists(&self.path, cancel).await
    }

    /// Backend snapshot, or `None` if the file does not exist.
    pub async fn blob_info(&self, cancel: &CancellationToken) -> VfsResult<Option<BlobMetadata>> {
        self.vfs.enter()?;
        self.key()?;
        self.vfs.metadata().get_blob_info(&self.path, cancel).await
    }

    /// Structured VFS metadata. `None` for missing files and for blobs
    /// written by something other than the VFS.
    pub async fn vfs_metadata(&self, cancel: &CancellationToken) -> VfsResult<Option<VfsMetadata>> {
        self.vfs.enter()?;
        self.key()?;
        self.vfs.metadata().get_vfs_metadata(&self.path, cancel).await
    }

    pub async fn custom_metadata(
        &self,
        cancel: &CancellationToken,
    ) -> VfsResult<HashMap<String, String>> {
        self.vfs.enter()?;
        self.key()?;
        self.vfs.metadata().get_custom_metadata(&self.path, cancel).await
    }

    pub async fn has_legal_hold(&self, cancel: &CancellationToken) -> VfsResult<bool> {
        self.vfs.enter()?;
        let key = self.key()?;
        cancellable(cancel, self.vfs.storage().has_legal_hold(&key)).await
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Read the whole file.
    pub async fn read_all(&self, cancel: &CancellationToken) -> VfsResult<Bytes> {
        let reader = self.open_read(cancel).await?;
        cancellable(cancel, read_to_bytes(reader)).await
    }

    /// Open the file for streaming reads.
    pub async fn open_read(&self, cancel: &CancellationToken) -> VfsResult<BlobReader> {
        self.vfs.enter()?;
        let key = self.key()?;
        cancellable(cancel, self.vfs.storage().open_read(&key)).await
    }

    /// Replace the file's content.
    pub async fn write(
        &self,
        data: impl Into<Bytes>,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        self.write_from(reader_from_bytes(data), cancel).await
    }

    /// Replace the file's content from a reader.
    ///
    /// Creation time, attributes and custom entries from an earlier version
    /// carry over; the modification time is bumped.
    pub async fn write_from(
        &self,
        reader: BlobReader,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        self.vfs.enter_writable()?;
        let key = self.key()?;

        let previous = self.vfs.metadata().lookup(&self.path, cancel).await?;
        let mut metadata = previous.vfs.unwrap_or_default();
        metadata.version = VFS_METADATA_VERSION;
        metadata.touch();
        let foreign = previous.blob.map(|b| b.metadata).unwrap_or_default();

        let options = UploadOptions::default()
            .with_content_type(guess_content_type(&key))
            .with_metadata(self.vfs.metadata().codec().encode(&metadata, &foreign));

        let result = cancellable(cancel, self.vfs.storage().upload(&key, reader, options)).await;
        self.vfs.cache().invalidate(&self.path);
        let blob = result?;
        debug!(path = %self.path, length = blob.length, "file written");
        Ok(blob)
    }

    /// Delete the file. Returns false if it did not exist.
    pub async fn delete(&self, cancel: &CancellationToken) -> VfsResult<bool> {
        self.vfs.enter_writable()?;
        let key = self.key()?;
        let result = cancellable(cancel, self.vfs.storage().delete(&key)).await;
        self.vfs.cache().invalidate(&self.path);
        result
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Replace the custom entries.
    pub async fn set_metadata(
        &self,
        custom: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        let mut metadata = self.current_metadata(cancel).await?;
        metadata.touch();
        self.vfs
            .metadata()
            .set_vfs_metadata(&self.path, metadata, Some(custom), None, cancel)
            .await
    }

    /// Replace the attribute bits.
    pub async fn set_attributes(
        &self,
        attributes: FileAttributes,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        let mut metadata = self.current_metadata(cancel).await?;
        metadata.attributes = attributes;
        metadata.touch();
        self.vfs
            .metadata()
            .set_vfs_metadata(&self.path, metadata, None, None, cancel)
            .await
    }

    /// Store `metadata` as given, only if the blob still has `expected_etag`.
    pub async fn update_metadata(
        &self,
        metadata: VfsMetadata,
        expected_etag: Option<&str>,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        self.vfs.enter_writable()?;
        self.key()?;
        self.vfs
            .metadata()
            .set_vfs_metadata(&self.path, metadata, None, expected_etag, cancel)
            .await
    }

    /// Existing VFS metadata, or fresh metadata dated from the blob.
    async fn current_metadata(&self, cancel: &CancellationToken) -> VfsResult<VfsMetadata> {
        self.vfs.enter_writable()?;
        self.key()?;
        let entry = self.vfs.metadata().lookup(&self.path, cancel).await?;
        let Some(blob) = entry.blob else {
            return Err(VfsError::not_found(self.path.as_str()));
        };
        Ok(entry.vfs.unwrap_or_else(|| {
            let mut fresh = VfsMetadata::new();
            fresh.created = blob.created;
            fresh
        }))
    }

    /// Place or release a legal hold.
    pub async fn set_legal_hold(&self, hold: bool, cancel: &CancellationToken) -> VfsResult<()> {
        self.vfs.enter_writable()?;
        let key = self.key()?;
        if !self.vfs.capabilities().legal_hold {
            return Err(VfsError::unsupported(format!(
                "{} does not support legal holds",
                self.vfs.storage().name()
            )));
        }
        cancellable(cancel, self.vfs.storage().set_legal_hold(&key, hold)).await
    }

    // ========================================================================
    // Transfer
    // ========================================================================

    pub async fn copy_to(
        &self,
        destination: impl Into<VfsPath>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        let options = CopyOptions::default().with_overwrite(overwrite);
        self.vfs.copy(&self.path, destination, options, cancel).await
    }

    pub async fn move_to(
        &self,
        destination: impl Into<VfsPath>,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        let options = MoveOptions::default().with_overwrite(overwrite);
        self.vfs.move_path(&self.path, destination, options, cancel).await
    }
}
