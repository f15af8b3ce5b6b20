//! Local filesystem blob storage.
//!
//! Each key maps to a regular file under `root`. Blob metadata that a
//! filesystem cannot hold (content type, etag, the metadata bag) lives in a
//! JSON side-car under `root/.strata/meta/`. Uploads land in
//! `root/.strata/tmp/` first and are renamed into place, so readers never
//! observe a half-written blob.
//!
//! Path security is enforced: keys with `.` or `..` segments are rejected and
//! resolved paths must stay under the canonical root.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use strata_types::BlobMetadata;

use super::{
    BlobCapabilities, BlobReader, BlobStorage, ListPage, StorageError, StorageResult,
    UploadOptions, guess_content_type,
};

/// Reserved directory for side-cars and staging files.
const RESERVED_DIR: &str = ".strata";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    etag: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Blob storage backed by a local directory.
///
/// For example, with `root` = `/srv/blobs`, key `docs/a.txt` is stored at
/// `/srv/blobs/docs/a.txt`.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    root: PathBuf,
    container: String,
}

impl LocalBlobStorage {
    /// Open an existing directory as blob storage.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root: PathBuf = root.into();
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(StorageError::invalid_key(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let container = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());
        Ok(Self { root, container })
    }

    /// Create `root` (and parents) if missing, then open it.
    pub fn create(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root: PathBuf = root.into();
        std::fs::create_dir_all(&root)?;
        Self::new(root)
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reserved_root(&self) -> PathBuf {
        self.root.join(RESERVED_DIR)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.reserved_root()
            .join("meta")
            .join(format!("{}.json", key))
    }

    /// Reject keys that could name anything other than a plain file under root.
    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.starts_with('/') || key.ends_with('/') || key.contains('\\') {
            return Err(StorageError::invalid_key(key));
        }
        for (i, segment) in key.split('/').enumerate() {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::invalid_key(key));
            }
            if i == 0 && segment == RESERVED_DIR {
                return Err(StorageError::invalid_key(key));
            }
        }
        let all_normal = Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !all_normal {
            return Err(StorageError::invalid_key(key));
        }
        Ok(())
    }

    /// Resolve a key to a path within the root.
    ///
    /// The nearest existing ancestor is canonicalized so a symlinked
    /// directory cannot lead outside the root.
    async fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        Self::validate_key(key)?;
        let full = self.root.join(key);

        let mut ancestor = full.parent();
        while let Some(dir) = ancestor {
            if fs::try_exists(dir).await? {
                let canonical = fs::canonicalize(dir).await?;
                if !canonical.starts_with(&self.root) {
                    return Err(StorageError::permission_denied(format!(
                        "{} is not under {}",
                        canonical.display(),
                        self.root.display()
                    )));
                }
                break;
            }
            ancestor = dir.parent();
        }

        Ok(full)
    }

    async fn read_sidecar(&self, key: &str) -> StorageResult<Option<Sidecar>> {
        match fs::read(self.sidecar_path(key)).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(sidecar) => Ok(Some(sidecar)),
                Err(e) => {
                    warn!(key, error = %e, "ignoring unreadable side-car");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(&self, key: &str, sidecar: &Sidecar) -> StorageResult<()> {
        let path = self.sidecar_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, serde_json::to_vec(sidecar)?).await?;
        Ok(())
    }

    async fn remove_quietly(path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove now-empty directories from `start` up to (not including) `stop`.
    async fn prune_empty_dirs(start: Option<&Path>, stop: &Path) {
        let mut dir = start;
        while let Some(d) = dir {
            if d == stop || !d.starts_with(stop) {
                break;
            }
            // remove_dir fails on non-empty directories, which ends the walk
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    async fn describe(&self, key: &str, path: &Path) -> StorageResult<Option<BlobMetadata>> {
        let fs_meta = match fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let fs_modified: DateTime<Utc> = fs_meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let blob = BlobMetadata::new(&self.container, key)
            .with_uri(format!("file://{}", path.display()))
            .with_length(fs_meta.len());

        let blob = match self.read_sidecar(key).await? {
            Some(sidecar) => blob
                .with_content_type(sidecar.content_type)
                .with_times(sidecar.created, sidecar.modified)
                .with_etag(sidecar.etag)
                .with_metadata(sidecar.metadata),
            None => {
                let created = fs_meta
                    .created()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(fs_modified);
                blob.with_content_type(guess_content_type(key))
                    .with_times(created, fs_modified)
            }
        };
        Ok(Some(blob))
    }

    /// All blob keys under `dir`, relative to root, unsorted.
    async fn walk_keys(&self, dir: PathBuf) -> StorageResult<Vec<String>> {
        let reserved = self.reserved_root();
        let mut keys = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != reserved {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let segments: Option<Vec<&str>> =
                    relative.components().map(|c| c.as_os_str().to_str()).collect();
                match segments {
                    Some(segments) => keys.push(segments.join("/")),
                    None => warn!(path = %path.display(), "skipping non UTF-8 file name"),
                }
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> BlobCapabilities {
        BlobCapabilities::none()
            .with_metadata_patch(true)
            .with_native_rename(true)
    }

    async fn upload(
        &self,
        key: &str,
        mut reader: BlobReader,
        options: UploadOptions,
    ) -> StorageResult<BlobMetadata> {
        let target = self.resolve(key).await?;

        let staging = self.reserved_root().join("tmp");
        fs::create_dir_all(&staging).await?;
        let tmp = staging.join(Uuid::new_v4().simple().to_string());

        let mut file = fs::File::create(&tmp).await?;
        let copied = tokio::io::copy(&mut reader, &mut file).await;
        let flushed = match copied {
            Ok(_) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = flushed {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let now = Utc::now();
        let created = match self.read_sidecar(key).await? {
            Some(previous) => previous.created,
            None => now,
        };
        let sidecar = Sidecar {
            content_type: options
                .content_type
                .unwrap_or_else(|| guess_content_type(key)),
            created,
            modified: now,
            etag: format!("\"{}\"", Uuid::new_v4().simple()),
            metadata: options.metadata,
        };
        self.write_sidecar(key, &sidecar).await?;
        trace!(key, "local upload");

        self.describe(key, &target)
            .await?
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn open_read(&self, key: &str) -> StorageResult<BlobReader> {
        let path = self.resolve(key).await?;
        match fs::metadata(&path).await {
            Ok(m) if m.is_file() => {}
            Ok(_) => return Err(StorageError::not_found(key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(key));
            }
            Err(e) => return Err(e.into()),
        }
        let file = fs::File::open(&path).await?;
        Ok(Box::pin(file))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key).await?;
        if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Ok(false);
        }
        let removed = Self::remove_quietly(&path).await?;

        let sidecar = self.sidecar_path(key);
        Self::remove_quietly(&sidecar).await?;

        if removed {
            Self::prune_empty_dirs(path.parent(), &self.root).await;
            Self::prune_empty_dirs(sidecar.parent(), &self.reserved_root().join("meta")).await;
            debug!(key, "local delete");
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key).await?;
        match fs::metadata(&path).await {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        let path = self.resolve(key).await?;
        self.describe(key, &path).await
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        let page_size = page_size.max(1);

        // Start the walk at the deepest directory the prefix names.
        let start = match prefix.rfind('/') {
            Some(idx) => self.root.join(&prefix[..idx]),
            None => self.root.clone(),
        };

        let mut keys = self.walk_keys(start).await?;
        keys.retain(|k| k.starts_with(prefix));
        if let Some(after) = continuation {
            keys.retain(|k| k.as_str() > after);
        }
        keys.sort();

        let has_more = keys.len() > page_size;
        keys.truncate(page_size);

        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            // A concurrent delete can remove a key between walk and describe.
            if let Some(blob) = self.describe(key, &self.root.join(key)).await? {
                items.push(blob);
            }
        }

        Ok(ListPage {
            items,
            continuation: if has_more { keys.last().cloned() } else { None },
        })
    }

    async fn set_metadata(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
        expected_etag: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        let path = self.resolve(key).await?;
        let current = self
            .describe(key, &path)
            .await?
            .ok_or_else(|| StorageError::not_found(key))?;

        if let Some(expected) = expected_etag {
            if current.etag.as_deref() != Some(expected) {
                return Err(StorageError::PreconditionFailed {
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual: current.etag.unwrap_or_default(),
                });
            }
        }

        let sidecar = Sidecar {
            content_type: current.content_type,
            created: current.created,
            modified: Utc::now(),
            etag: format!("\"{}\"", Uuid::new_v4().simple()),
            metadata,
        };
        self.write_sidecar(key, &sidecar).await?;

        self.describe(key, &path)
            .await?
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<BlobMetadata> {
        let from_path = self.resolve(from).await?;
        let to_path = self.resolve(to).await?;

        if !fs::metadata(&from_path).await.is_ok_and(|m| m.is_file()) {
            return Err(StorageError::not_found(from));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from_path, &to_path).await?;

        let from_sidecar = self.sidecar_path(from);
        let to_sidecar = self.sidecar_path(to);
        if fs::try_exists(&from_sidecar).await? {
            if let Some(parent) = to_sidecar.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&from_sidecar, &to_sidecar).await?;
        } else {
            Self::remove_quietly(&to_sidecar).await?;
        }

        Self::prune_empty_dirs(from_path.parent(), &self.root).await;
        Self::prune_empty_dirs(from_sidecar.parent(), &self.reserved_root().join("meta")).await;

        self.describe(to, &to_path)
            .await?
            .ok_or_else(|| StorageError::not_found(to))
    }
}
