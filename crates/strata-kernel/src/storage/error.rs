//! Blob-storage error types.

use std::io;
use thiserror::Error;

/// Errors raised by a [`BlobStorage`](super::BlobStorage) implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No blob under this key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// A blob already occupies this key.
    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    /// ETag guard did not match.
    #[error("precondition failed for {key}: expected etag {expected}, found {actual}")]
    PreconditionFailed {
        key: String,
        expected: String,
        actual: String,
    },

    /// The backend does not implement this capability.
    #[error("not supported by this backend: {0}")]
    Unsupported(String),

    /// The backend refused the operation (legal hold, path escape, ...).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The key cannot be represented by this backend.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Side-car or wire serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    /// Create a NotFound error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported(capability.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an InvalidKey error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    /// Create a Backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Returns true for a missing blob, including I/O `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Blob-storage result type.
pub type StorageResult<T> = Result<T, StorageError>;
