//! VFS error types.

use std::future::Future;
use std::io;

use strum::{Display, EnumString};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::storage::StorageError;

/// Coarse error classification for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unsupported,
    BackendIo,
    Cancelled,
    Disposed,
    ReadOnly,
    PermissionDenied,
    InvalidPath,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Destination exists or an ETag guard did not match.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend lacks a capability this operation needs.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(StorageError),

    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The VFS instance has been disposed.
    #[error("vfs has been disposed")]
    Disposed,

    /// The mount is read-only.
    #[error("filesystem is read-only")]
    ReadOnly,

    /// Permission denied (legal hold, path escape, ...).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No mount point for path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::NoMountPoint(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Backend(_) | Self::Io(_) | Self::Other(_) => ErrorKind::BackendIo,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Disposed => ErrorKind::Disposed,
            Self::ReadOnly => ErrorKind::ReadOnly,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
        }
    }

    /// Returns true for [`ErrorKind::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<StorageError> for VfsError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::AlreadyExists(key) => Self::Conflict(format!("already exists: {key}")),
            e @ StorageError::PreconditionFailed { .. } => Self::Conflict(e.to_string()),
            StorageError::Unsupported(what) => Self::Unsupported(what),
            StorageError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            StorageError::InvalidKey(key) => Self::InvalidPath(key),
            StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::NotFound(e.to_string())
            }
            other => Self::Backend(other),
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Conflict(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::Backend(StorageError::Io(e)) => e,
            VfsError::Backend(e) => io::Error::other(e),
            VfsError::Cancelled => {
                io::Error::new(io::ErrorKind::Interrupted, "operation cancelled")
            }
            VfsError::Disposed => {
                io::Error::new(io::ErrorKind::NotConnected, "vfs has been disposed")
            }
            VfsError::ReadOnly => {
                io::Error::new(io::ErrorKind::PermissionDenied, "filesystem is read-only")
            }
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NoMountPoint(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

/// Fail with [`VfsError::Cancelled`] if the token has fired.
pub fn check_cancel(cancel: &CancellationToken) -> VfsResult<()> {
    if cancel.is_cancelled() {
        Err(VfsError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run `fut` unless `cancel` fires first.
///
/// A cancelled backend call may still have taken effect remotely; nothing is
/// rolled back.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> VfsResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<VfsError>,
{
    check_cancel(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VfsError::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}
