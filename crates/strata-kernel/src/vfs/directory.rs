//! Directory handles.
//!
//! A directory has no blob of its own. It exists while any key lives under
//! its prefix, so creating one means writing a file into it.

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use strata_types::{DirectoryStats, VfsNode, VfsPath};

use crate::error::VfsResult;

use super::{
    BulkOptions, CopyOptions, DeleteReport, ListOptions, MoveOptions, TransferReport, Vfs, VfsFile,
};

/// Handle for a directory: a key prefix that exists while any blob lives under it.
#[derive(Debug, Clone)]
pub struct VfsDirectory {
    vfs: Vfs,
    path: VfsPath,
}

impl VfsDirectory {
    pub(crate) fn new(vfs: Vfs, path: VfsPath) -> Self {
        Self { vfs, path }
    }

    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// The enclosing directory; `None` at the root.
    pub fn parent(&self) -> Option<VfsDirectory> {
        self.path
            .parent()
            .map(|parent| VfsDirectory::new(self.vfs.clone(), parent))
    }

    pub fn file(&self, name: impl AsRef<str>) -> VfsFile {
        VfsFile::new(self.vfs.clone(), self.path.join(name))
    }

    pub fn subdirectory(&self, name: impl AsRef<str>) -> VfsDirectory {
        VfsDirectory::new(self.vfs.clone(), self.path.join(name))
    }

    pub async fn exists(&self, cancel: &CancellationToken) -> VfsResult<bool> {
        self.vfs.directory_exists(&self.path, cancel).await
    }

    pub fn list(
        &self,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, VfsResult<VfsNode>> {
        self.vfs.list(&self.path, options, cancel)
    }

    pub async fn stats(&self, cancel: &CancellationToken) -> VfsResult<DirectoryStats> {
        self.vfs.directory_stats(&self.path, cancel).await
    }

    pub async fn delete(
        &self,
        recursive: bool,
        options: BulkOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<DeleteReport> {
        self.vfs
            .delete_directory(&self.path, recursive, options, cancel)
            .await
    }

    pub async fn copy_to(
        &self,
        destination: impl Into<VfsPath>,
        options: CopyOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        self.vfs.copy(&self.path, destination, options, cancel).await
    }

    pub async fn move_to(
        &self,
        destination: impl Into<VfsPath>,
        options: MoveOptions,
        cancel: &CancellationToken,
    ) -> VfsResult<TransferReport> {
        self.vfs
            .move_path(&self.path, destination, options, cancel)
            .await
    }
}
