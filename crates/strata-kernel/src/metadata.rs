//! VFS metadata on top of the backend's string bag.
//!
//! [`MetadataCodec`] maps [`VfsMetadata`] to and from reserved keys in a
//! blob's raw metadata map. With the default `x-vfs-` prefix:
//!
//! | Key                  | Value                          |
//! |----------------------|--------------------------------|
//! | `x-vfs-version`      | schema version (decimal)       |
//! | `x-vfs-created`      | RFC 3339 UTC                   |
//! | `x-vfs-modified`     | RFC 3339 UTC                   |
//! | `x-vfs-attributes`   | attribute bits (decimal)       |
//! | `x-vfs-meta-<name>`  | one custom entry               |
//!
//! Keys outside the prefix belong to someone else and are carried through
//! every update untouched. A bag without the version key is not VFS metadata.
//!
//! [`MetadataManager`] is the read-through path: it consults the
//! [`MetadataCache`], falls back to one `get_metadata` call on a miss, and
//! invalidates on update.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use strata_types::{BlobMetadata, FileAttributes, VFS_METADATA_VERSION, VfsMetadata, VfsPath};

use crate::cache::{CacheEntry, MetadataCache};
use crate::error::{VfsError, VfsResult, cancellable, check_cancel};
use crate::storage::{BlobStorage, UploadOptions};

// ============================================================================
// Codec
// ============================================================================

/// Encodes [`VfsMetadata`] into a raw metadata bag under a key prefix.
#[derive(Debug, Clone)]
pub struct MetadataCodec {
    prefix: String,
}

impl MetadataCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn custom_prefix(&self) -> String {
        self.key("meta-")
    }

    /// Write `metadata` into `bag`, replacing every earlier VFS key and
    /// keeping foreign keys.
    pub fn encode_into(&self, metadata: &VfsMetadata, bag: &mut HashMap<String, String>) {
        bag.retain(|k, _| !k.starts_with(&self.prefix));
        bag.insert(self.key("version"), metadata.version.to_string());
        bag.insert(self.key("created"), metadata.created.to_rfc3339());
        bag.insert(self.key("modified"), metadata.modified.to_rfc3339());
        bag.insert(
            self.key("attributes"),
            metadata.attributes.bits().to_string(),
        );
        let custom_prefix = self.custom_prefix();
        for (name, value) in &metadata.custom {
            bag.insert(format!("{custom_prefix}{name}"), value.clone());
        }
    }

    /// A fresh bag holding `metadata` plus `foreign` keys.
    pub fn encode(
        &self,
        metadata: &VfsMetadata,
        foreign: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut bag = foreign.clone();
        self.encode_into(metadata, &mut bag);
        bag
    }

    /// Decode the VFS view of `blob`. `None` when no version key is present.
    pub fn decode(&self, blob: &BlobMetadata) -> Option<VfsMetadata> {
        let bag = &blob.metadata;
        let raw_version = bag.get(&self.key("version"))?;

        let version = raw_version.parse().unwrap_or_else(|_| {
            debug!(key = %blob.key, value = %raw_version, "malformed metadata version");
            VFS_METADATA_VERSION
        });
        let created = self.decode_time(blob, "created").unwrap_or(blob.created);
        let modified = self.decode_time(blob, "modified").unwrap_or(blob.modified);
        let attributes = match bag.get(&self.key("attributes")) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(bits) => FileAttributes::from_bits_truncate(bits),
                Err(_) => {
                    debug!(key = %blob.key, value = %raw, "malformed attributes");
                    FileAttributes::NONE
                }
            },
            None => FileAttributes::NONE,
        };

        Some(VfsMetadata {
            version,
            created,
            modified,
            attributes,
            custom: self.decode_custom(bag),
        })
    }

    /// Custom entries, with the reserved prefix stripped.
    pub fn decode_custom(&self, bag: &HashMap<String, String>) -> HashMap<String, String> {
        let custom_prefix = self.custom_prefix();
        bag.iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&custom_prefix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect()
    }

    fn decode_time(&self, blob: &BlobMetadata, field: &str) -> Option<DateTime<Utc>> {
        let raw = blob.metadata.get(&self.key(field))?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                debug!(key = %blob.key, field, error = %e, "malformed metadata timestamp");
                None
            }
        }
    }
}

impl Default for MetadataCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_METADATA_PREFIX)
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Read-through metadata access for one VFS.
pub struct MetadataManager {
    storage: Arc<dyn BlobStorage>,
    cache: Arc<MetadataCache>,
    codec: MetadataCodec,
    rewrite_on_update: bool,
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("storage", &self.storage.name())
            .field("codec", &self.codec)
            .field("rewrite_on_update", &self.rewrite_on_update)
            .finish()
    }
}

impl MetadataManager {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        cache: Arc<MetadataCache>,
        codec: MetadataCodec,
        rewrite_on_update: bool,
    ) -> Self {
        Self {
            storage,
            cache,
            codec,
            rewrite_on_update,
        }
    }

    pub fn codec(&self) -> &MetadataCodec {
        &self.codec
    }

    /// Cached view of `path`, fetching once on a miss.
    pub async fn lookup(
        &self,
        path: &VfsPath,
        cancel: &CancellationToken,
    ) -> VfsResult<CacheEntry> {
        if let Some(entry) = self.cache.get(path) {
            return Ok(entry);
        }

        let generation = self.cache.generation();
        let key = path.to_key();
        let blob = cancellable(cancel, self.storage.get_metadata(&key)).await?;

        let entry = match blob {
            Some(blob) => {
                let vfs = self.codec.decode(&blob);
                CacheEntry::present(blob, vfs)
            }
            None => CacheEntry::absent(),
        };
        let stored = self
            .cache
            .insert_if_current(path.clone(), entry.clone(), generation);
        debug!(%path, exists = entry.exists(), stored, "metadata fetched");
        Ok(entry)
    }

    pub async fn exists(&self, path: &VfsPath, cancel: &CancellationToken) -> VfsResult<bool> {
        Ok(self.lookup(path, cancel).await?.exists())
    }

    pub async fn get_blob_info(
        &self,
        path: &VfsPath,
        cancel: &CancellationToken,
    ) -> VfsResult<Option<BlobMetadata>> {
        Ok(self.lookup(path, cancel).await?.blob)
    }

    pub async fn get_vfs_metadata(
        &self,
        path: &VfsPath,
        cancel: &CancellationToken,
    ) -> VfsResult<Option<VfsMetadata>> {
        Ok(self.lookup(path, cancel).await?.vfs)
    }

    /// Custom entries for `path`. Fails with `NotFound` if the file is absent.
    pub async fn get_custom_metadata(
        &self,
        path: &VfsPath,
        cancel: &CancellationToken,
    ) -> VfsResult<HashMap<String, String>> {
        let entry = self.lookup(path, cancel).await?;
        match entry.blob {
            Some(blob) => Ok(self.codec.decode_custom(&blob.metadata)),
            None => Err(VfsError::not_found(path.as_str())),
        }
    }

    /// Store `metadata` for an existing file.
    ///
    /// `custom`, when given, replaces `metadata.custom`. Backends that can
    /// patch metadata do so in place; others get the blob re-uploaded with
    /// the new bag when rewriting is enabled, and `Unsupported` otherwise.
    pub async fn set_vfs_metadata(
        &self,
        path: &VfsPath,
        mut metadata: VfsMetadata,
        custom: Option<HashMap<String, String>>,
        expected_etag: Option<&str>,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        if let Some(custom) = custom {
            metadata.custom = custom;
        }
        let result = self
            .apply_metadata(path, &metadata, expected_etag, cancel)
            .await;
        self.cache.invalidate(path);
        result
    }

    async fn apply_metadata(
        &self,
        path: &VfsPath,
        metadata: &VfsMetadata,
        expected_etag: Option<&str>,
        cancel: &CancellationToken,
    ) -> VfsResult<BlobMetadata> {
        let key = path.to_key();
        let current = cancellable(cancel, self.storage.get_metadata(&key))
            .await?
            .ok_or_else(|| VfsError::not_found(path.as_str()))?;

        let bag = self.codec.encode(metadata, &current.metadata);
        let capabilities = self.storage.capabilities();

        if capabilities.metadata_patch {
            return cancellable(cancel, self.storage.set_metadata(&key, bag, expected_etag)).await;
        }

        if !self.rewrite_on_update {
            return Err(VfsError::unsupported(format!(
                "{} cannot update metadata without rewriting {}",
                self.storage.name(),
                path
            )));
        }

        if let Some(expected) = expected_etag {
            if current.etag.as_deref() != Some(expected) {
                return Err(VfsError::conflict(format!(
                    "{}: expected etag {}, found {}",
                    path,
                    expected,
                    current.etag.as_deref().unwrap_or("<none>")
                )));
            }
        }

        debug!(%path, "rewriting blob to update metadata");
        check_cancel(cancel)?;
        let reader = self.storage.open_read(&key).await?;
        let options = UploadOptions::default()
            .with_content_type(current.content_type)
            .with_metadata(bag);
        cancellable(cancel, self.storage.upload(&key, reader, options)).await
    }
}
