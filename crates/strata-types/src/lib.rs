//! Shared path, blob and metadata types for Strata.
//!
//! This crate is the leaf of the workspace: it has **no internal strata
//! dependencies** and holds the plain data shapes every other crate speaks.
//!
//! # Key Types
//!
//! |--------------------|---------------------------------------------------|
//! | Type               | Purpose                                           |
//! |--------------------|---------------------------------------------------|
//! | [`VfsPath`]        | Normalized absolute path, maps to blob keys       |
//! | [`BlobMetadata`]   | Backend snapshot of one stored blob               |
//! | [`VfsMetadata`]    | VFS-owned timestamps, attributes, custom entries  |
//! | [`FileAttributes`] | Hidden/system/read-only/... bit-set               |
//! | [`VfsNode`]        | One listing result (file or synthesized dir)      |
//! | [`DirectoryStats`] | Subtree aggregate: count, size, extensions        |
//! |--------------------|---------------------------------------------------|

pub mod blob;
pub mod metadata;
pub mod node;
pub mod path;
pub mod stats;

pub use blob::{BlobMetadata, DEFAULT_CONTENT_TYPE};
pub use metadata::{FileAttributes, VFS_METADATA_VERSION, VfsMetadata};
pub use node::{NodeKind, VfsNode};
pub use path::VfsPath;
pub use stats::DirectoryStats;
