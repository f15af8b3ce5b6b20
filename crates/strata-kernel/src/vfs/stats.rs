//! Directory statistics. Always recomputed from a full prefix scan.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use strata_types::{DirectoryStats, VfsPath};

use crate::error::VfsResult;
use crate::storage::list_blobs;

use super::Vfs;
use super::listing::next_blob;

pub(super) async fn directory_stats(
    vfs: &Vfs,
    dir: &VfsPath,
    cancel: &CancellationToken,
) -> VfsResult<DirectoryStats> {
    vfs.enter()?;

    let mut blobs = list_blobs(
        vfs.storage().clone(),
        dir.to_prefix(),
        vfs.options().page_size,
    );
    let mut stats = DirectoryStats::default();

    while let Some(blob) = next_blob(&mut blobs, cancel).await? {
        if blob.key.ends_with('/') {
            continue;
        }
        stats.record(&VfsPath::from_key(&blob.key), blob.length, blob.modified);
    }

    debug!(%dir, files = stats.file_count, bytes = stats.total_size, "directory stats");
    Ok(stats)
}
