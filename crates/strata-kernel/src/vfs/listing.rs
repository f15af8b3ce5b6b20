//! Directory listing over prefix scans.
//!
//! A non-recursive listing of `/docs` scans the prefix `docs/`, yields blobs
//! whose remaining key has no `/`, and synthesizes one directory node per
//! distinct first segment of the rest. A recursive listing yields every blob
//! and each intermediate directory once. Keys ending in `/` are directory
//! markers written by other tools; they contribute directories, never files.

use std::collections::{HashSet, VecDeque};

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use strata_types::{BlobMetadata, VfsNode, VfsPath};

use crate::error::{VfsError, VfsResult};
use crate::storage::{StorageResult, list_blobs};

use super::Vfs;

/// What a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    pub include_files: bool,
    pub include_directories: bool,
    /// Backend page size; the VFS default when `None`.
    pub page_size: Option<usize>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            include_files: true,
            include_directories: true,
            page_size: None,
        }
    }
}

impl ListOptions {
    /// Every file and directory in the subtree.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub fn files_only(mut self) -> Self {
        self.include_files = true;
        self.include_directories = false;
        self
    }

    pub fn directories_only(mut self) -> Self {
        self.include_files = false;
        self.include_directories = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Pull the next blob, or fail with `Cancelled` if the token fires first.
pub(crate) async fn next_blob(
    blobs: &mut BoxStream<'static, StorageResult<BlobMetadata>>,
    cancel: &CancellationToken,
) -> VfsResult<Option<BlobMetadata>> {
    let next = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = blobs.next() => Some(item),
    };
    match next {
        None => Err(VfsError::Cancelled),
        Some(None) => Ok(None),
        Some(Some(item)) => Ok(Some(item?)),
    }
}

struct Lister {
    vfs: Vfs,
    dir: VfsPath,
    prefix: String,
    options: ListOptions,
    blobs: BoxStream<'static, StorageResult<BlobMetadata>>,
    cancel: CancellationToken,
    seen_dirs: HashSet<VfsPath>,
    seen_files: HashSet<String>,
    pending: VecDeque<VfsNode>,
    finished: bool,
}

impl Lister {
    fn accept(&mut self, blob: BlobMetadata) {
        let Some(relative) = blob.key.strip_prefix(&self.prefix) else {
            return;
        };
        let is_marker = relative.ends_with('/');
        let mut segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return;
        }
        if !is_marker {
            segments.pop();
        }

        if self.options.include_directories {
            let depth = if self.options.recursive {
                segments.len()
            } else {
                segments.len().min(1)
            };
            let mut current = self.dir.clone();
            for segment in &segments[..depth] {
                current = current.join(segment);
                if self.seen_dirs.insert(current.clone()) {
                    self.pending.push_back(VfsNode::directory(current.clone()));
                }
            }
        }

        let direct = segments.is_empty();
        if is_marker || !self.options.include_files || !(self.options.recursive || direct) {
            return;
        }
        if self.seen_files.insert(blob.key.clone()) {
            let path = VfsPath::from_key(&blob.key);
            self.pending.push_back(VfsNode::file(path, blob));
        }
    }
}

pub(super) fn list(
    vfs: Vfs,
    dir: VfsPath,
    options: ListOptions,
    cancel: CancellationToken,
) -> BoxStream<'static, VfsResult<VfsNode>> {
    if let Err(e) = vfs.enter() {
        return stream::once(async move { Err(e) }).boxed();
    }

    let prefix = dir.to_prefix();
    let page_size = options.page_size.unwrap_or(vfs.options().page_size);
    let blobs = list_blobs(vfs.storage().clone(), prefix.clone(), page_size);

    let lister = Lister {
        vfs,
        dir,
        prefix,
        options,
        blobs,
        cancel,
        seen_dirs: HashSet::new(),
        seen_files: HashSet::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(lister, |mut lister| async move {
        loop {
            if let Some(node) = lister.pending.pop_front() {
                return Some((Ok(node), lister));
            }
            if lister.finished {
                return None;
            }
            if let Err(e) = lister.vfs.enter() {
                lister.finished = true;
                return Some((Err(e), lister));
            }

            match next_blob(&mut lister.blobs, &lister.cancel).await {
                Ok(Some(blob)) => lister.accept(blob),
                Ok(None) => lister.finished = true,
                Err(e) => {
                    lister.finished = true;
                    lister.pending.clear();
                    return Some((Err(e), lister));
                }
            }
        }
    })
    .boxed()
}
