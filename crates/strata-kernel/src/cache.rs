//! Existence and metadata cache.
//!
//! One entry per path, filled on a read-through miss and dropped by any
//! mutation that touches the path. There is no TTL and no eviction: an entry
//! lives until something invalidates it or the VFS is disposed.
//!
//! Fills race with invalidations: a lookup can fetch from the backend, lose
//! the CPU while a write lands and invalidates, then come back with a stale
//! snapshot. Every invalidation bumps a generation counter, and a fill is only
//! stored if the generation it started under is still current. The check and
//! the insert happen under the map's shard lock, and invalidation bumps before
//! it removes, so a stale fill either sees the new generation or is removed
//! right after it lands.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tracing::trace;

use strata_types::{BlobMetadata, VfsMetadata, VfsPath};

/// A memoized lookup result. `blob == None` records a confirmed absence.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub blob: Option<BlobMetadata>,
    pub vfs: Option<VfsMetadata>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn present(blob: BlobMetadata, vfs: Option<VfsMetadata>) -> Self {
        Self {
            blob: Some(blob),
            vfs,
            fetched_at: Instant::now(),
        }
    }

    pub fn absent() -> Self {
        Self {
            blob: None,
            vfs: None,
            fetched_at: Instant::now(),
        }
    }

    pub fn exists(&self) -> bool {
        self.blob.is_some()
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Per-VFS path cache.
#[derive(Debug)]
pub struct MetadataCache {
    entries: DashMap<VfsPath, CacheEntry>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    enabled: bool,
}

impl MetadataCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up `path`, counting a hit or a miss.
    pub fn get(&self, path: &VfsPath) -> Option<CacheEntry> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match self.entries.get(path) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(%path, exists = entry.exists(), "cache hit");
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(%path, "cache miss");
                None
            }
        }
    }

    /// Generation to pass to [`insert_if_current`](Self::insert_if_current).
    ///
    /// Read it before the backend fetch starts.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `entry` unless an invalidation happened since `generation`.
    pub fn insert_if_current(&self, path: VfsPath, entry: CacheEntry, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        // Holding the entry keeps the shard locked until the insert is done.
        let slot = self.entries.entry(path);
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        slot.insert(entry);
        true
    }

    /// Drop the entry for `path`.
    pub fn invalidate(&self, path: &VfsPath) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(path);
    }

    /// Drop `dir` and every entry beneath it.
    pub fn invalidate_prefix(&self, dir: &VfsPath) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.entries.retain(|path, _| !path.starts_with(dir));
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
