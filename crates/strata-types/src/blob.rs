//! Blob snapshots as reported by a storage backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback MIME type for content nobody could classify.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for one stored blob.
///
/// An immutable snapshot: backends hand out fresh values and the VFS replaces
/// cached copies wholesale rather than editing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Logical name (last key segment).
    pub name: String,
    /// Full key within the container.
    pub key: String,
    /// Container / bucket identifier.
    pub container: String,
    /// Backend-specific URI for the blob.
    pub uri: String,
    /// Size in bytes.
    pub length: u64,
    /// MIME type.
    pub content_type: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Opaque version token, when the backend has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Raw string metadata bag.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BlobMetadata {
    /// Create a snapshot for `key` in `container` with empty content.
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        let container = container.into();
        let key = key.into();
        let now = Utc::now();
        Self {
            name: key.rsplit('/').next().unwrap_or_default().to_string(),
            uri: format!("{}/{}", container, key),
            key,
            container,
            length: 0,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            created: now,
            modified: now,
            etag: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Set the length.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set both timestamps.
    pub fn with_times(mut self, created: DateTime<Utc>, modified: DateTime<Utc>) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    /// Set the ETag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Replace the metadata bag.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}
