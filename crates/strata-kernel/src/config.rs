//! VFS and mount configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! [defaults]
//! page_size = 500
//! bulk_concurrency = 16
//!
//! [[mounts]]
//! path = "/scratch"
//! backend = { type = "memory" }
//!
//! [[mounts]]
//! path = "/data"
//! backend = { type = "local", root = "/srv/blobs", create = true }
//! options = { read_only = true }
//! ```
//!
//! Per-mount `options` replace `defaults` field by field; anything a mount
//! leaves out falls back to the defaults table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use strata_types::VfsPath;

use crate::storage::{BlobStorage, LocalBlobStorage, MemoryBlobStorage, StorageError};

/// Reserved metadata key prefix.
pub const DEFAULT_METADATA_PREFIX: &str = "x-vfs-";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate mount point: {0}")]
    DuplicateMount(String),

    #[error("invalid option {field}: {reason}")]
    InvalidOption { field: &'static str, reason: String },

    #[error("failed to open backend for {mount}: {source}")]
    Backend {
        mount: String,
        #[source]
        source: StorageError,
    },
}

/// Behaviour switches for one VFS instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Items requested per listing page.
    pub page_size: usize,
    /// Maximum in-flight backend requests for bulk operations.
    pub bulk_concurrency: usize,
    /// Memoize existence and metadata lookups.
    pub cache_enabled: bool,
    /// Reject every mutating operation.
    pub read_only: bool,
    /// Prefix for the VFS keys in the backend metadata bag.
    pub metadata_prefix: String,
    /// Re-upload the blob to change metadata when the backend cannot patch it.
    pub rewrite_on_metadata_update: bool,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            bulk_concurrency: 8,
            cache_enabled: true,
            read_only: false,
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            rewrite_on_metadata_update: true,
        }
    }
}

impl VfsOptions {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_bulk_concurrency(mut self, concurrency: usize) -> Self {
        self.bulk_concurrency = concurrency;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    pub fn with_rewrite_on_metadata_update(mut self, enabled: bool) -> Self {
        self.rewrite_on_metadata_update = enabled;
        self
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidOption {
                field: "page_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.bulk_concurrency == 0 {
            return Err(ConfigError::InvalidOption {
                field: "bulk_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.metadata_prefix.is_empty() {
            return Err(ConfigError::InvalidOption {
                field: "metadata_prefix",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Partial [`VfsOptions`] for one mount; unset fields inherit the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsOptionsOverride {
    pub page_size: Option<usize>,
    pub bulk_concurrency: Option<usize>,
    pub cache_enabled: Option<bool>,
    pub read_only: Option<bool>,
    pub metadata_prefix: Option<String>,
    pub rewrite_on_metadata_update: Option<bool>,
}

impl VfsOptionsOverride {
    /// Overlay onto `base`.
    pub fn apply(&self, base: &VfsOptions) -> VfsOptions {
        VfsOptions {
            page_size: self.page_size.unwrap_or(base.page_size),
            bulk_concurrency: self.bulk_concurrency.unwrap_or(base.bulk_concurrency),
            cache_enabled: self.cache_enabled.unwrap_or(base.cache_enabled),
            read_only: self.read_only.unwrap_or(base.read_only),
            metadata_prefix: self
                .metadata_prefix
                .clone()
                .unwrap_or_else(|| base.metadata_prefix.clone()),
            rewrite_on_metadata_update: self
                .rewrite_on_metadata_update
                .unwrap_or(base.rewrite_on_metadata_update),
        }
    }
}

/// Which backend a mount uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process memory store.
    Memory {
        #[serde(default)]
        container: Option<String>,
    },
    /// A local directory.
    Local {
        root: PathBuf,
        /// Create the directory if it does not exist.
        #[serde(default)]
        create: bool,
    },
}

impl BackendConfig {
    /// Build the configured backend.
    pub fn build(&self) -> Result<Arc<dyn BlobStorage>, StorageError> {
        match self {
            Self::Memory { container } => {
                let storage = match container {
                    Some(name) => MemoryBlobStorage::new().with_container(name),
                    None => MemoryBlobStorage::new(),
                };
                Ok(Arc::new(storage))
            }
            Self::Local { root, create } => {
                let storage = if *create {
                    LocalBlobStorage::create(root)?
                } else {
                    LocalBlobStorage::new(root)?
                };
                Ok(Arc::new(storage))
            }
        }
    }
}

/// One configured mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount point, e.g. `/data`.
    pub path: String,
    pub backend: BackendConfig,
    #[serde(default)]
    pub options: Option<VfsOptionsOverride>,
}

impl MountConfig {
    /// Effective options given the global defaults.
    pub fn effective_options(&self, defaults: &VfsOptions) -> VfsOptions {
        match &self.options {
            Some(overrides) => overrides.apply(defaults),
            None => defaults.clone(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub defaults: VfsOptions,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl StrataConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StrataConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject duplicate mount points and out-of-range options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.validate()?;
        let mut seen = HashSet::new();
        for mount in &self.mounts {
            let point = VfsPath::new(&mount.path);
            if !seen.insert(point.clone()) {
                return Err(ConfigError::DuplicateMount(point.to_string()));
            }
            mount.effective_options(&self.defaults).validate()?;
        }
        Ok(())
    }
}
