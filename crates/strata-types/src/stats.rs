//! Directory statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::VfsPath;

/// Aggregate over a directory subtree.
///
/// Always computed from a fresh enumeration; never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStats {
    /// Number of files in the subtree.
    pub file_count: u64,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// File counts keyed by extension (`.txt`, case preserved). Files without
    /// an extension are counted under the empty key.
    pub extensions: BTreeMap<String, u64>,
    /// Newest modification time seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DirectoryStats {
    /// Fold one file into the aggregate.
    pub fn record(&mut self, path: &VfsPath, length: u64, modified: DateTime<Utc>) {
        self.file_count += 1;
        self.total_size += length;

        let key = path
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        *self.extensions.entry(key).or_insert(0) += 1;

        if self.last_modified.is_none_or(|seen| modified > seen) {
            self.last_modified = Some(modified);
        }
    }

    /// Count of files with the given extension (`.txt` form).
    pub fn count_for(&self, extension: &str) -> u64 {
        self.extensions.get(extension).copied().unwrap_or(0)
    }

    /// Mean file size, or zero for an empty subtree.
    pub fn average_size(&self) -> u64 {
        if self.file_count == 0 {
            0
        } else {
            self.total_size / self.file_count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_aggregates() {
        let mut stats = DirectoryStats::default();
        let early = Utc::now() - Duration::hours(1);
        let late = Utc::now();

        stats.record(&VfsPath::new("/a/one.txt"), 10, late);
        stats.record(&VfsPath::new("/a/b/two.txt"), 20, early);
        stats.record(&VfsPath::new("/a/photo.JPG"), 30, early);
        stats.record(&VfsPath::new("/a/Makefile"), 5, early);

        assert_eq!(stats.file_count, 4);
        assert_eq!(stats.total_size, 65);
        assert_eq!(stats.count_for(".txt"), 2);
        assert_eq!(stats.count_for(".JPG"), 1);
        assert_eq!(stats.count_for(".jpg"), 0);
        assert_eq!(stats.count_for(""), 1);
        assert_eq!(stats.last_modified, Some(late));
        assert_eq!(stats.average_size(), 16);
    }

    #[test]
    fn test_empty_stats() {
        let stats = DirectoryStats::default();
        assert_eq!(stats.average_size(), 0);
        assert!(stats.last_modified.is_none());
    }
}
