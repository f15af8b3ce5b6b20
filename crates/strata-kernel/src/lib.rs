//! # strata-kernel
//!
//! A virtual filesystem over flat blob storage.
//!
//! Blob stores have keys, not directories. The kernel layers a tree on top:
//! `/docs/report.pdf` lives under the key `docs/report.pdf`, the directory
//! `/docs` is the prefix `docs/`, and everything a filesystem needs beyond
//! that is derived from prefix scans and the blob's own metadata bag.
//!
//! - [`storage`] - the [`BlobStorage`] trait plus memory and local backends
//! - [`Vfs`] - one filesystem over one backend: files, directories, bulk ops
//! - [`MetadataManager`] - VFS metadata in the blob bag, with a read-through cache
//! - [`MountManager`] - several filesystems under one namespace
//! - [`StrataConfig`] - TOML configuration for options and mounts
//!
//! Every operation that touches the backend is async and takes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod cache;
pub mod config;
pub mod error;
pub mod metadata;
pub mod mount;
pub mod storage;
pub mod vfs;

pub use cache::{CacheEntry, CacheStats, MetadataCache};
pub use config::{
    BackendConfig, ConfigError, DEFAULT_METADATA_PREFIX, MountConfig, StrataConfig, VfsOptions,
    VfsOptionsOverride,
};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use metadata::{MetadataCodec, MetadataManager};
pub use mount::{MountInfo, MountManager};
pub use storage::{
    BlobCapabilities, BlobReader, BlobStorage, InstrumentedStorage, LocalBlobStorage,
    MemoryBlobStorage, StorageError, StorageResult, UploadOptions,
};
pub use vfs::{
    BulkFailure, BulkOptions, CopyOptions, DeleteReport, ListOptions, MoveOptions, TransferReport,
    Vfs, VfsDirectory, VfsFile, VfsState,
};

pub use strata_types::{
    BlobMetadata, DirectoryStats, FileAttributes, NodeKind, VfsMetadata, VfsNode, VfsPath,
};
