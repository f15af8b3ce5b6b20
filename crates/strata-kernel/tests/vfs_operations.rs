//! End-to-end VFS behaviour over the memory backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use strata_kernel::storage::{BlobReader, ListPage, StorageError, StorageResult, UploadOptions};
use strata_kernel::{
    BlobCapabilities, BlobMetadata, BlobStorage, BulkOptions, CopyOptions, ErrorKind,
    InstrumentedStorage, ListOptions, MemoryBlobStorage, MoveOptions, Vfs, VfsError, VfsNode,
    VfsOptions,
};

fn setup() -> (Vfs, CancellationToken) {
    strata_telemetry::init_test_tracing();
    let vfs = Vfs::new(Arc::new(MemoryBlobStorage::new()), VfsOptions::default());
    (vfs, CancellationToken::new())
}

async fn collect(vfs: &Vfs, dir: &str, options: ListOptions) -> Vec<VfsNode> {
    let cancel = CancellationToken::new();
    vfs.list(dir, options, &cancel).try_collect().await.unwrap()
}

fn paths(nodes: &[VfsNode]) -> Vec<String> {
    let mut paths: Vec<String> = nodes.iter().map(|n| n.path.to_string()).collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn unicode_names_round_trip() {
    let (vfs, cancel) = setup();
    let file = vfs.file("/文档/報告 2024 ü.txt");
    file.write("内容", &cancel).await.unwrap();

    assert_eq!(file.read_all(&cancel).await.unwrap().as_ref(), "内容".as_bytes());
    assert_eq!(file.name(), "報告 2024 ü.txt");

    let nodes = collect(&vfs, "/文档", ListOptions::default()).await;
    assert_eq!(paths(&nodes), vec!["/文档/報告 2024 ü.txt"]);
    assert!(vfs.directory_exists("/文档", &cancel).await.unwrap());
    assert!(!vfs.file_exists("/文档/報告 2024 Ü.txt", &cancel).await.unwrap());
}

#[tokio::test]
async fn non_latin_scripts_round_trip_through_storage() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(MemoryBlobStorage::new());
    let vfs = Vfs::new(storage.clone(), VfsOptions::default());
    let cancel = CancellationToken::new();
    let names = [
        "/Документы/отчёт.txt",
        "/문서/보고서 최종.txt",
        "/emoji/🚀 launch 🎉.md",
    ];
    for name in names {
        vfs.file(name).write(name, &cancel).await.unwrap();
    }

    let mut keys = storage.keys();
    keys.sort();
    let mut expected: Vec<String> = names.iter().map(|n| n[1..].to_string()).collect();
    expected.sort();
    assert_eq!(keys, expected);

    let listed = collect(&vfs, "/", ListOptions::recursive().files_only()).await;
    let mut sorted = names.map(String::from).to_vec();
    sorted.sort();
    assert_eq!(paths(&listed), sorted);

    for name in names {
        let file = vfs.file(name);
        assert_eq!(file.read_all(&cancel).await.unwrap().as_ref(), name.as_bytes());
    }
    let dirs = collect(&vfs, "/", ListOptions::default().directories_only()).await;
    assert_eq!(paths(&dirs), vec!["/emoji", "/Документы", "/문서"]);
    assert_eq!(vfs.file("/emoji/🚀 launch 🎉.md").name(), "🚀 launch 🎉.md");
}

#[tokio::test]
async fn listing_synthesizes_directories() {
    let (vfs, cancel) = setup();
    for path in ["/docs/a.txt", "/docs/b/c.txt", "/docs/b/d/e.txt", "/other.txt"] {
        vfs.file(path).write("x", &cancel).await.unwrap();
    }

    let shallow = collect(&vfs, "/docs", ListOptions::default()).await;
    assert_eq!(paths(&shallow), vec!["/docs/a.txt", "/docs/b"]);
    assert!(shallow.iter().any(|n| n.kind.is_dir() && n.name() == "b"));

    let deep = collect(&vfs, "/docs", ListOptions::recursive()).await;
    assert_eq!(
        paths(&deep),
        vec![
            "/docs/a.txt",
            "/docs/b",
            "/docs/b/c.txt",
            "/docs/b/d",
            "/docs/b/d/e.txt"
        ]
    );

    let files = collect(&vfs, "/docs", ListOptions::recursive().files_only()).await;
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|n| n.kind.is_file() && n.blob.is_some()));

    let dirs = collect(&vfs, "/", ListOptions::default().directories_only()).await;
    assert_eq!(paths(&dirs), vec!["/docs"]);

    assert!(collect(&vfs, "/missing", ListOptions::default()).await.is_empty());
}

#[tokio::test]
async fn listing_pages_through_the_backend() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(InstrumentedStorage::new(MemoryBlobStorage::new()));
    let vfs = Vfs::new(storage.clone(), VfsOptions::default());
    let cancel = CancellationToken::new();

    for i in 0..5 {
        vfs.file(format!("/logs/{i}.log")).write("line", &cancel).await.unwrap();
    }
    storage.reset();

    let nodes = collect(&vfs, "/logs", ListOptions::default().with_page_size(2)).await;
    assert_eq!(nodes.len(), 5);
    assert_eq!(storage.calls().list_page, 3);
    let expected: Vec<String> = (0..5).map(|i| format!("/logs/{i}.log")).collect();
    assert_eq!(paths(&nodes), expected);
    assert!(nodes.iter().all(|n| n.kind.is_file()));
}

#[tokio::test]
async fn listing_stops_when_cancelled_mid_stream() {
    let (vfs, cancel) = setup();
    for i in 0..5 {
        vfs.file(format!("/q/{i}.txt")).write("x", &cancel).await.unwrap();
    }

    let listing_cancel = CancellationToken::new();
    let mut stream = vfs.list("/q", ListOptions::default().with_page_size(1), &listing_cancel);
    let first = stream.try_next().await.unwrap().unwrap();
    assert_eq!(first.path.as_str(), "/q/0.txt");
    stream.try_next().await.unwrap().unwrap();

    listing_cancel.cancel();
    assert!(matches!(stream.try_next().await, Err(VfsError::Cancelled)));
    assert!(stream.try_next().await.unwrap().is_none());
}

#[tokio::test]
async fn markers_are_directories_not_files() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(MemoryBlobStorage::new());
    let cancel = CancellationToken::new();
    storage
        .upload(
            "docs/empty/",
            strata_kernel::storage::reader_from_bytes(""),
            UploadOptions::default(),
        )
        .await
        .unwrap();
    let vfs = Vfs::new(storage.clone(), VfsOptions::default());

    let nodes = collect(&vfs, "/docs", ListOptions::recursive()).await;
    assert_eq!(paths(&nodes), vec!["/docs/empty"]);
    assert!(nodes[0].kind.is_dir());

    let stats = vfs.directory_stats("/docs", &cancel).await.unwrap();
    assert_eq!(stats.file_count, 0);
}

#[tokio::test]
async fn delete_directory_respects_recursion() {
    let (vfs, cancel) = setup();
    for path in ["/d/root.txt", "/d/sub/nested.txt"] {
        vfs.file(path).write("x", &cancel).await.unwrap();
    }

    let report = vfs
        .delete_directory("/d", false, BulkOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_deleted, 1);
    assert!(report.is_complete());
    assert!(vfs.file_exists("/d/sub/nested.txt", &cancel).await.unwrap());
    assert!(!vfs.file_exists("/d/root.txt", &cancel).await.unwrap());

    let report = vfs
        .delete_directory("/d", true, BulkOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_deleted, 1);
    assert!(!vfs.directory_exists("/d", &cancel).await.unwrap());
}

#[tokio::test]
async fn move_directory_preserves_content_and_metadata() {
    let (vfs, cancel) = setup();
    for i in 1..=4 {
        let file = vfs.file(format!("/src/n{i}.bin"));
        file.write(vec![i as u8; i], &cancel).await.unwrap();
    }
    let mut custom = HashMap::new();
    custom.insert("tag".to_string(), "keep".to_string());
    vfs.file("/src/n1.bin").set_metadata(custom, &cancel).await.unwrap();

    let report = vfs
        .move_path("/src", "/dst", MoveOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 4);
    assert_eq!(report.files_removed, 4);
    assert_eq!(report.bytes_copied, 1 + 2 + 3 + 4);
    assert!(report.is_complete());

    assert!(!vfs.directory_exists("/src", &cancel).await.unwrap());
    for i in 1..=4 {
        let data = vfs
            .file(format!("/dst/n{i}.bin"))
            .read_all(&cancel)
            .await
            .unwrap();
        assert_eq!(data.as_ref(), vec![i as u8; i].as_slice());
    }
    let moved = vfs.file("/dst/n1.bin").custom_metadata(&cancel).await.unwrap();
    assert_eq!(moved["tag"], "keep");
}

#[tokio::test]
async fn move_single_file() {
    let (vfs, cancel) = setup();
    vfs.file("/docs/report.pdf").write(vec![1u8, 2, 3, 4], &cancel).await.unwrap();

    vfs.move_path("/docs/report.pdf", "/archive/report.pdf", MoveOptions::default(), &cancel)
        .await
        .unwrap();

    let moved = vfs.file("/archive/report.pdf").read_all(&cancel).await.unwrap();
    assert_eq!(moved.as_ref(), &[1u8, 2, 3, 4][..]);
    let err = vfs.file("/docs/report.pdf").read_all(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn single_file_move_and_copy() {
    let (vfs, cancel) = setup();
    vfs.file("/docs/report.pdf").write("pdf", &cancel).await.unwrap();
    vfs.file("/archive/report.pdf").write("old", &cancel).await.unwrap();

    let err = vfs
        .file("/docs/report.pdf")
        .copy_to("/archive/report.pdf", false, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let report = vfs
        .file("/docs/report.pdf")
        .move_to("/archive/report.pdf", true, &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_removed, 1);
    assert!(!vfs.file_exists("/docs/report.pdf", &cancel).await.unwrap());
    let blob = vfs
        .file("/archive/report.pdf")
        .blob_info(&cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blob.content_type, "application/pdf");
    assert_eq!(
        vfs.file("/archive/report.pdf").read_all(&cancel).await.unwrap().as_ref(),
        &b"pdf"[..]
    );

    let err = vfs
        .copy("/nowhere", "/elsewhere", CopyOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = vfs
        .copy("/archive", "/archive/nested", CopyOptions::recursive(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::InvalidPath(_)));
}

#[tokio::test]
async fn copy_directory_shallow_and_recursive() {
    let (vfs, cancel) = setup();
    for path in ["/a/1.txt", "/a/2.txt", "/a/deep/3.txt"] {
        vfs.file(path).write("x", &cancel).await.unwrap();
    }

    let report = vfs
        .copy("/a", "/b", CopyOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 2);
    assert!(!vfs.file_exists("/b/deep/3.txt", &cancel).await.unwrap());

    let report = vfs
        .copy("/a", "/c", CopyOptions::recursive(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 3);
    assert!(vfs.file_exists("/c/deep/3.txt", &cancel).await.unwrap());
    assert!(vfs.file_exists("/a/deep/3.txt", &cancel).await.unwrap());

    let report = vfs
        .copy("/a", "/c", CopyOptions::recursive(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 0);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.error.kind() == ErrorKind::Conflict));
}

#[tokio::test]
async fn metadata_reads_are_cached() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(InstrumentedStorage::new(MemoryBlobStorage::new()));
    let vfs = Vfs::new(storage.clone(), VfsOptions::default());
    let cancel = CancellationToken::new();

    let file = vfs.file("/meta.txt");
    file.write("x", &cancel).await.unwrap();
    let custom = HashMap::from([
        ("owner".to_string(), "qa".to_string()),
        ("region".to_string(), "eu".to_string()),
    ]);
    file.set_metadata(custom.clone(), &cancel).await.unwrap();
    storage.reset();

    assert_eq!(file.custom_metadata(&cancel).await.unwrap(), custom);
    assert_eq!(storage.calls().lookups(), 1);

    assert_eq!(file.custom_metadata(&cancel).await.unwrap(), custom);
    assert!(file.exists(&cancel).await.unwrap());
    assert_eq!(storage.calls().total(), 1);
    assert!(vfs.cache_stats().hits >= 2);

    file.delete(&cancel).await.unwrap();
    storage.reset();
    assert!(!file.exists(&cancel).await.unwrap());
    assert_eq!(storage.calls().lookups(), 1);
    assert!(!file.exists(&cancel).await.unwrap());
    assert_eq!(storage.calls().lookups(), 1);
}

#[tokio::test]
async fn disabled_cache_always_reaches_the_backend() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(InstrumentedStorage::new(MemoryBlobStorage::new()));
    let vfs = Vfs::new(storage.clone(), VfsOptions::default().with_cache(false));
    let cancel = CancellationToken::new();

    vfs.file("/a.txt").write("x", &cancel).await.unwrap();
    storage.reset();
    for _ in 0..3 {
        assert!(vfs.file_exists("/a.txt", &cancel).await.unwrap());
    }
    assert_eq!(storage.calls().lookups(), 3);
}

#[tokio::test]
async fn foreign_blobs_are_plain_files() {
    strata_telemetry::init_test_tracing();
    let storage = Arc::new(MemoryBlobStorage::new());
    let options = UploadOptions::default()
        .with_metadata(HashMap::from([("uploader".to_string(), "cli".to_string())]));
    storage
        .upload(
            "imported.csv",
            strata_kernel::storage::reader_from_bytes("a,b"),
            options,
        )
        .await
        .unwrap();
    let vfs = Vfs::new(storage.clone(), VfsOptions::default());
    let cancel = CancellationToken::new();

    let file = vfs.file("/imported.csv");
    assert!(file.vfs_metadata(&cancel).await.unwrap().is_none());
    assert!(file.custom_metadata(&cancel).await.unwrap().is_empty());

    file.write("a,b,c", &cancel).await.unwrap();
    let blob = file.blob_info(&cancel).await.unwrap().unwrap();
    assert_eq!(blob.metadata["uploader"], "cli");
    assert!(file.vfs_metadata(&cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn legal_hold_blocks_delete_in_bulk() {
    let (vfs, cancel) = setup();
    for path in ["/held/a.txt", "/held/b.txt", "/held/c.txt"] {
        vfs.file(path).write("x", &cancel).await.unwrap();
    }
    let held = vfs.file("/held/b.txt");
    held.set_legal_hold(true, &cancel).await.unwrap();
    assert!(held.has_legal_hold(&cancel).await.unwrap());

    let report = vfs
        .delete_directory("/held", false, BulkOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_deleted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path.as_str(), "/held/b.txt");
    assert_eq!(report.failures[0].error.kind(), ErrorKind::PermissionDenied);
    assert!(held.exists(&cancel).await.unwrap());

    let err = vfs
        .delete_directory("/held", false, BulkOptions::default().fail_fast(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    held.set_legal_hold(false, &cancel).await.unwrap();
    assert!(held.delete(&cancel).await.unwrap());
}

#[tokio::test]
async fn legal_hold_requires_the_capability() {
    strata_telemetry::init_test_tracing();
    let storage = MemoryBlobStorage::new().with_capabilities(BlobCapabilities::none());
    let vfs = Vfs::new(Arc::new(storage), VfsOptions::default());
    let cancel = CancellationToken::new();

    let file = vfs.file("/a.txt");
    file.write("x", &cancel).await.unwrap();
    let err = file.set_legal_hold(true, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test]
async fn disposed_vfs_rejects_everything() {
    let (vfs, cancel) = setup();
    let file = vfs.file("/a.txt");
    file.write("x", &cancel).await.unwrap();
    let dir = vfs.directory("/");

    assert!(vfs.dispose());
    assert!(matches!(file.read_all(&cancel).await, Err(VfsError::Disposed)));
    assert!(matches!(dir.stats(&cancel).await, Err(VfsError::Disposed)));
    let listed: Result<Vec<VfsNode>, VfsError> =
        vfs.list("/", ListOptions::default(), &cancel).try_collect().await;
    assert!(matches!(listed, Err(VfsError::Disposed)));
    assert_eq!(vfs.cache_stats().entries, 0);
}

/// What [`Scripted`] storage does besides delegating to memory.
enum Script {
    /// Fire the token on every delete.
    CancelOnDelete(CancellationToken),
    /// Fire the token on every upload.
    CancelOnUpload(CancellationToken),
    /// Deleting `failing` errors after a short wait; other deletes apply,
    /// then linger before returning.
    SlowDeletes { failing: &'static str },
}

/// Memory storage with hooks around writes.
struct Scripted {
    inner: Arc<MemoryBlobStorage>,
    script: Script,
}

impl Scripted {
    fn over(inner: &Arc<MemoryBlobStorage>, script: Script) -> Arc<Self> {
        Arc::new(Self {
            inner: inner.clone(),
            script,
        })
    }
}

#[async_trait]
impl BlobStorage for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> BlobCapabilities {
        self.inner.capabilities()
    }

    async fn upload(
        &self,
        key: &str,
        reader: BlobReader,
        options: UploadOptions,
    ) -> StorageResult<BlobMetadata> {
        if let Script::CancelOnUpload(cancel) = &self.script {
            cancel.cancel();
        }
        self.inner.upload(key, reader, options).await
    }

    async fn open_read(&self, key: &str) -> StorageResult<BlobReader> {
        self.inner.open_read(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        match &self.script {
            Script::CancelOnDelete(cancel) => {
                cancel.cancel();
                self.inner.delete(key).await
            }
            Script::SlowDeletes { failing } if key == *failing => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(StorageError::PermissionDenied(key.to_string()))
            }
            Script::SlowDeletes { .. } => {
                let removed = self.inner.delete(key).await;
                tokio::time::sleep(Duration::from_millis(80)).await;
                removed
            }
            Script::CancelOnUpload(_) => self.inner.delete(key).await,
        }
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        self.inner.get_metadata(key).await
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        self.inner.list_page(prefix, continuation, page_size).await
    }
}

#[tokio::test]
async fn cancellation_stops_new_items_and_reports_exactly() {
    strata_telemetry::init_test_tracing();
    let cancel = CancellationToken::new();
    let memory = Arc::new(MemoryBlobStorage::new());
    let vfs = Vfs::new(
        Scripted::over(&memory, Script::CancelOnDelete(cancel.clone())),
        VfsOptions::default(),
    );
    for path in ["/c/1.txt", "/c/2.txt", "/c/3.txt"] {
        vfs.file(path).write("x", &cancel).await.unwrap();
    }

    let report = vfs
        .delete_directory("/c", false, BulkOptions::default().with_concurrency(1), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_deleted, 1);
    assert!(report.cancelled);
    assert!(!report.is_complete());

    let fresh = CancellationToken::new();
    let remaining = collect(&vfs, "/c", ListOptions::default()).await;
    assert_eq!(remaining.len(), 2);
    assert!(!vfs.file_exists("/c/1.txt", &fresh).await.unwrap());
}

#[tokio::test]
async fn fail_fast_delete_leaves_cache_consistent() {
    strata_telemetry::init_test_tracing();
    let memory = Arc::new(MemoryBlobStorage::new());
    let cancel = CancellationToken::new();
    let seed = Vfs::new(memory.clone(), VfsOptions::default());
    for path in ["/d/a.txt", "/d/b.txt"] {
        seed.file(path).write("x", &cancel).await.unwrap();
    }

    let vfs = Vfs::new(
        Scripted::over(&memory, Script::SlowDeletes { failing: "d/a.txt" }),
        VfsOptions::default(),
    );
    assert!(vfs.file_exists("/d/b.txt", &cancel).await.unwrap());

    let err = vfs
        .delete_directory(
            "/d",
            false,
            BulkOptions::default().with_concurrency(2).fail_fast(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    assert!(!memory.exists("d/b.txt").await.unwrap());
    assert!(!vfs.file_exists("/d/b.txt", &cancel).await.unwrap());
    assert!(vfs.file_exists("/d/a.txt", &cancel).await.unwrap());
}

#[tokio::test]
async fn copy_and_move_stop_on_cancellation() {
    strata_telemetry::init_test_tracing();
    let memory = Arc::new(MemoryBlobStorage::new());
    let cancel = CancellationToken::new();
    let seed = Vfs::new(memory.clone(), VfsOptions::default());
    for path in ["/s/1.txt", "/s/2.txt", "/s/3.txt"] {
        seed.file(path).write("x", &cancel).await.unwrap();
    }

    let copy_cancel = CancellationToken::new();
    let vfs = Vfs::new(
        Scripted::over(&memory, Script::CancelOnUpload(copy_cancel.clone())),
        VfsOptions::default(),
    );
    let report = vfs
        .copy("/s", "/t", CopyOptions::default().with_concurrency(1), &copy_cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 1);
    assert!(report.cancelled);
    assert_eq!(collect(&seed, "/t", ListOptions::default()).await.len(), 1);

    let move_cancel = CancellationToken::new();
    let vfs = Vfs::new(
        Scripted::over(&memory, Script::CancelOnDelete(move_cancel.clone())),
        VfsOptions::default(),
    );
    let report = vfs
        .move_path("/s", "/m", MoveOptions::default().with_concurrency(1), &move_cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 1);
    assert_eq!(report.files_removed, 1);
    assert!(report.cancelled);
    assert_eq!(collect(&seed, "/s", ListOptions::default()).await.len(), 2);
    assert_eq!(collect(&seed, "/m", ListOptions::default()).await.len(), 1);

    let err = vfs
        .copy("/t", "/u", CopyOptions::default(), &move_cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Cancelled));
}

#[tokio::test]
async fn moves_and_copies_carry_empty_directories() {
    strata_telemetry::init_test_tracing();
    let memory = Arc::new(MemoryBlobStorage::new());
    let cancel = CancellationToken::new();
    memory
        .upload(
            "src/empty/",
            strata_kernel::storage::reader_from_bytes(""),
            UploadOptions::default(),
        )
        .await
        .unwrap();
    let vfs = Vfs::new(memory.clone(), VfsOptions::default());
    vfs.file("/src/a.txt").write("abc", &cancel).await.unwrap();

    let report = vfs
        .copy("/src", "/copy", CopyOptions::recursive(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 1);
    assert!(report.is_complete());
    let copied = collect(&vfs, "/copy", ListOptions::recursive()).await;
    assert_eq!(paths(&copied), vec!["/copy/a.txt", "/copy/empty"]);

    let report = vfs
        .move_path("/src", "/dst", MoveOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 1);
    assert_eq!(report.bytes_copied, 3);
    assert!(report.is_complete());

    assert!(!vfs.directory_exists("/src", &cancel).await.unwrap());
    assert!(!memory.keys().iter().any(|key| key.starts_with("src/")));
    assert!(memory.keys().contains(&"dst/empty/".to_string()));
    let moved = collect(&vfs, "/dst", ListOptions::recursive()).await;
    assert_eq!(paths(&moved), vec!["/dst/a.txt", "/dst/empty"]);
    assert!(vfs.directory_exists("/dst/empty", &cancel).await.unwrap());
}
