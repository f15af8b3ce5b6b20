//! Mount table with longest-prefix routing.
//!
//! Each mount point owns one [`Vfs`]. A path resolves to the mount whose
//! point is its longest ancestor on a segment boundary, so with `/data` and
//! `/data/archive` both mounted, `/data/archive/2024/a.txt` routes to the
//! second and becomes `/2024/a.txt` inside it. `/data2` never matches `/data`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use strata_types::VfsPath;

use crate::config::{ConfigError, StrataConfig, VfsOptions};
use crate::error::{VfsError, VfsResult};
use crate::storage::{BlobCapabilities, BlobStorage};
use crate::vfs::{Vfs, VfsState};

/// Information about a mount point.
#[derive(Debug, Clone, Serialize)]
pub struct MountInfo {
    pub mount_point: VfsPath,
    /// Backend name, e.g. `memory` or `local`.
    pub backend: String,
    pub capabilities: BlobCapabilities,
    pub read_only: bool,
    pub state: VfsState,
}

/// Routes paths to mounted filesystems.
pub struct MountManager {
    mounts: RwLock<BTreeMap<VfsPath, Vfs>>,
}

impl std::fmt::Debug for MountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountManager")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MountManager {
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount `storage` at `point`, replacing and disposing any previous mount there.
    pub async fn mount(
        &self,
        point: impl Into<VfsPath>,
        storage: Arc<dyn BlobStorage>,
        options: VfsOptions,
    ) -> Vfs {
        let point = point.into();
        let backend = storage.name().to_string();
        let vfs = Vfs::new(storage, options);

        let previous = {
            let mut mounts = self.mounts.write().await;
            mounts.insert(point.clone(), vfs.clone())
        };
        if let Some(previous) = previous {
            previous.dispose();
            info!(mount = %point, backend, "replaced existing mount");
        } else {
            info!(mount = %point, backend, "mounted");
        }
        vfs
    }

    /// Unmount and dispose the filesystem at `point`.
    ///
    /// Returns false if nothing was mounted there.
    pub async fn unmount(&self, point: impl Into<VfsPath>) -> bool {
        let point = point.into();
        let removed = self.mounts.write().await.remove(&point);
        match removed {
            Some(vfs) => {
                vfs.dispose();
                info!(mount = %point, "unmounted");
                true
            }
            None => {
                warn!(mount = %point, "unmount of unknown mount point");
                false
            }
        }
    }

    /// Unmount everything. Returns how many mounts were removed.
    pub async fn unmount_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.mounts.write().await);
        for vfs in drained.values() {
            vfs.dispose();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "unmounted all");
        }
        drained.len()
    }

    /// Split `path` into its mount point and the path inside that mount.
    pub async fn resolve_path(&self, path: impl Into<VfsPath>) -> VfsResult<(VfsPath, VfsPath)> {
        let path = path.into();
        let mounts = self.mounts.read().await;
        let (point, _) = Self::longest_match(&mounts, &path)?;
        let inner = path
            .strip_prefix(point)
            .ok_or_else(|| VfsError::no_mount_point(path.as_str()))?;
        Ok((point.clone(), inner))
    }

    /// The filesystem serving `path`, and the path inside it.
    pub async fn resolve(&self, path: impl Into<VfsPath>) -> VfsResult<(Vfs, VfsPath)> {
        let path = path.into();
        let mounts = self.mounts.read().await;
        let (point, vfs) = Self::longest_match(&mounts, &path)?;
        let inner = path
            .strip_prefix(point)
            .ok_or_else(|| VfsError::no_mount_point(path.as_str()))?;
        Ok((vfs.clone(), inner))
    }

    /// The filesystem mounted exactly at `point`.
    pub async fn get_mount(&self, point: impl Into<VfsPath>) -> VfsResult<Vfs> {
        let point = point.into();
        self.mounts
            .read()
            .await
            .get(&point)
            .cloned()
            .ok_or_else(|| VfsError::no_mount_point(point.as_str()))
    }

    /// All mounts, ordered by mount point.
    pub async fn get_mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .iter()
            .map(|(point, vfs)| MountInfo {
                mount_point: point.clone(),
                backend: vfs.storage().name().to_string(),
                capabilities: vfs.capabilities(),
                read_only: vfs.options().read_only,
                state: vfs.state(),
            })
            .collect()
    }

    /// Open every backend in `config`, then mount them all.
    ///
    /// Nothing is mounted if any backend fails to open.
    pub async fn mount_from_config(&self, config: &StrataConfig) -> Result<Vec<Vfs>, ConfigError> {
        config.validate()?;

        let mut prepared = Vec::with_capacity(config.mounts.len());
        for mount in &config.mounts {
            let storage = mount
                .backend
                .build()
                .map_err(|source| ConfigError::Backend {
                    mount: mount.path.clone(),
                    source,
                })?;
            prepared.push((
                VfsPath::new(&mount.path),
                storage,
                mount.effective_options(&config.defaults),
            ));
        }

        let mut mounted = Vec::with_capacity(prepared.len());
        for (point, storage, options) in prepared {
            mounted.push(self.mount(point, storage, options).await);
        }
        Ok(mounted)
    }

    fn longest_match<'a>(
        mounts: &'a BTreeMap<VfsPath, Vfs>,
        path: &VfsPath,
    ) -> VfsResult<(&'a VfsPath, &'a Vfs)> {
        mounts
            .iter()
            .filter(|(point, _)| path.starts_with(point))
            .max_by_key(|(point, _)| point.as_str().len())
            .ok_or_else(|| VfsError::no_mount_point(path.as_str()))
    }
}
