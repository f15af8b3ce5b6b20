//! VFS-owned structured metadata.
//!
//! [`VfsMetadata`] is what the VFS layers on top of a blob's raw string bag:
//! a schema version, its own timestamps, an attribute bit-set and a custom
//! string map. The encoding into the bag lives in the kernel's metadata
//! manager; this module only defines the shapes.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current VFS metadata schema version.
pub const VFS_METADATA_VERSION: u32 = 1;

/// File attribute bit-set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileAttributes(u32);

impl FileAttributes {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// Hidden from ordinary listings by convention.
    pub const HIDDEN: Self = Self(1 << 0);
    /// Owned by the system.
    pub const SYSTEM: Self = Self(1 << 1);
    /// Marked read-only.
    pub const READ_ONLY: Self = Self(1 << 2);
    /// Pending archival.
    pub const ARCHIVE: Self = Self(1 << 3);
    /// Temporary content.
    pub const TEMPORARY: Self = Self(1 << 4);
    /// Stored compressed.
    pub const COMPRESSED: Self = Self(1 << 5);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::HIDDEN, "HIDDEN"),
        (Self::SYSTEM, "SYSTEM"),
        (Self::READ_ONLY, "READ_ONLY"),
        (Self::ARCHIVE, "ARCHIVE"),
        (Self::TEMPORARY, "TEMPORARY"),
        (Self::COMPRESSED, "COMPRESSED"),
    ];

    const ALL_BITS: u32 = (1 << 6) - 1;

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns true if every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no bits are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("FileAttributes(NONE)");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "FileAttributes({})", names.join(" | "))
    }
}

/// Structured metadata the VFS keeps alongside each file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsMetadata {
    /// Schema version the metadata was written with.
    pub version: u32,
    /// When the file was first written through the VFS.
    pub created: DateTime<Utc>,
    /// Last write or metadata change through the VFS.
    pub modified: DateTime<Utc>,
    /// Attribute bits.
    pub attributes: FileAttributes,
    /// Caller-defined string entries.
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl Default for VfsMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsMetadata {
    /// Fresh metadata stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: VFS_METADATA_VERSION,
            created: now,
            modified: now,
            attributes: FileAttributes::NONE,
            custom: HashMap::new(),
        }
    }

    /// Bump the modification time.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    /// Set the attributes.
    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Replace the custom map.
    pub fn with_custom(mut self, custom: HashMap<String, String>) -> Self {
        self.custom = custom;
        self
    }

    /// Add one custom entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}
