//! Listing results.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::blob::BlobMetadata;
use crate::path::VfsPath;

/// What a listed node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A blob.
    File,
    /// A directory synthesized from key prefixes.
    Directory,
}

impl NodeKind {
    /// Returns true if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

/// One entry yielded by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsNode {
    /// Full path within the VFS.
    pub path: VfsPath,
    /// Entry type.
    pub kind: NodeKind,
    /// Blob snapshot for files. Directories have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobMetadata>,
}

impl VfsNode {
    /// A file node backed by `blob`.
    pub fn file(path: VfsPath, blob: BlobMetadata) -> Self {
        Self {
            path,
            kind: NodeKind::File,
            blob: Some(blob),
        }
    }

    /// A synthesized directory node.
    pub fn directory(path: VfsPath) -> Self {
        Self {
            path,
            kind: NodeKind::Directory,
            blob: None,
        }
    }

    /// Entry name (last path segment).
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or("")
    }

    /// Size in bytes; zero for directories.
    pub fn len(&self) -> u64 {
        self.blob.as_ref().map(|b| b.length).unwrap_or(0)
    }

    /// Returns true if the node has no content.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
