//! Mount routing, TOML configuration and the local-directory backend.

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use strata_kernel::{
    BlobStorage, ConfigError, ErrorKind, ListOptions, LocalBlobStorage, MemoryBlobStorage,
    MountManager, MoveOptions, StrataConfig, VfsError, VfsNode, VfsOptions,
};

#[tokio::test]
async fn mounts_route_by_longest_prefix() {
    strata_telemetry::init_test_tracing();
    let manager = MountManager::new();
    let cancel = CancellationToken::new();
    let foo = manager
        .mount("/foo", Arc::new(MemoryBlobStorage::new()), VfsOptions::default())
        .await;
    manager
        .mount("/foo2", Arc::new(MemoryBlobStorage::new()), VfsOptions::default())
        .await;

    let (vfs, inner) = manager.resolve("/foo/notes/a.txt").await.unwrap();
    assert_eq!(vfs.id(), foo.id());
    vfs.file(&inner).write("a", &cancel).await.unwrap();
    assert!(foo.file_exists("/notes/a.txt", &cancel).await.unwrap());

    let (point, inner) = manager.resolve_path("/foo2/a.txt").await.unwrap();
    assert_eq!(point.as_str(), "/foo2");
    assert_eq!(inner.as_str(), "/a.txt");

    let err = manager.resolve_path("/bar/a.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn remount_disposes_the_old_instance() {
    strata_telemetry::init_test_tracing();
    let manager = MountManager::new();
    let cancel = CancellationToken::new();
    let old = manager
        .mount("data", Arc::new(MemoryBlobStorage::new()), VfsOptions::default())
        .await;
    let file = old.file("/kept.txt");
    file.write("x", &cancel).await.unwrap();

    let new = manager
        .mount("/data/", Arc::new(MemoryBlobStorage::new()), VfsOptions::default())
        .await;
    assert!(matches!(file.exists(&cancel).await, Err(VfsError::Disposed)));
    assert!(!new.file_exists("/kept.txt", &cancel).await.unwrap());

    let mounts = manager.get_mounts().await;
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].mount_point.as_str(), "/data");
}

#[tokio::test]
async fn config_mounts_local_and_memory() {
    strata_telemetry::init_test_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("blobs");
    let toml = format!(
        r#"
        [defaults]
        page_size = 2

        [[mounts]]
        path = "/disk"
        backend = {{ type = "local", root = "{}", create = true }}

        [[mounts]]
        path = "/ro"
        backend = {{ type = "memory" }}
        options = {{ read_only = true }}
        "#,
        root.display()
    );
    let path = dir.path().join("strata.toml");
    tokio::fs::write(&path, toml).await.unwrap();

    let config = StrataConfig::load(&path).await.unwrap();
    let manager = MountManager::new();
    manager.mount_from_config(&config).await.unwrap();
    let cancel = CancellationToken::new();

    let (disk, _) = manager.resolve("/disk").await.unwrap();
    assert_eq!(disk.options().page_size, 2);
    assert_eq!(disk.storage().name(), "local");
    disk.file("/x/y.txt").write("hello", &cancel).await.unwrap();
    assert!(root.join("x").join("y.txt").exists());

    let (ro, _) = manager.resolve("/ro/anything").await.unwrap();
    let err = ro.file("/a.txt").write("x", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
}

#[tokio::test]
async fn config_rejects_duplicate_mounts() {
    let err = StrataConfig::from_toml_str(
        r#"
        [[mounts]]
        path = "/a"
        backend = { type = "memory" }

        [[mounts]]
        path = "/a/"
        backend = { type = "memory" }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateMount(_)));
}

#[tokio::test]
async fn missing_local_root_fails_to_mount() {
    let dir = TempDir::new().unwrap();
    let config = StrataConfig::from_toml_str(&format!(
        r#"
        [[mounts]]
        path = "/gone"
        backend = {{ type = "local", root = "{}" }}
        "#,
        dir.path().join("absent").display()
    ))
    .unwrap();

    let manager = MountManager::new();
    let err = manager.mount_from_config(&config).await.unwrap_err();
    assert!(matches!(err, ConfigError::Backend { .. }));
    assert!(manager.get_mounts().await.is_empty());
}

#[tokio::test]
async fn local_backend_supports_the_full_vfs() {
    strata_telemetry::init_test_tracing();
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalBlobStorage::new(dir.path()).unwrap());
    let manager = MountManager::new();
    let vfs = manager.mount("/", storage, VfsOptions::default()).await;
    let cancel = CancellationToken::new();

    for path in ["/proj/src/main.rs", "/proj/src/lib.rs", "/proj/README.md"] {
        vfs.file(path).write(path.as_bytes().to_vec(), &cancel).await.unwrap();
    }
    let custom = HashMap::from([("owner".to_string(), "qa".to_string())]);
    vfs.file("/proj/README.md").set_metadata(custom, &cancel).await.unwrap();

    let nodes: Vec<VfsNode> = vfs
        .list("/proj", ListOptions::recursive(), &cancel)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(nodes.iter().filter(|n| n.kind.is_file()).count(), 3);
    assert_eq!(nodes.iter().filter(|n| n.kind.is_dir()).count(), 1);

    let stats = vfs.directory_stats("/proj", &cancel).await.unwrap();
    assert_eq!(stats.file_count, 3);
    assert_eq!(stats.count_for(".rs"), 2);
    assert_eq!(stats.count_for(".md"), 1);

    let report = vfs
        .move_path("/proj", "/moved", MoveOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.files_copied, 3);
    assert!(!vfs.directory_exists("/proj", &cancel).await.unwrap());

    let readme = vfs.file("/moved/README.md");
    assert_eq!(readme.custom_metadata(&cancel).await.unwrap()["owner"], "qa");
    assert_eq!(
        readme.read_all(&cancel).await.unwrap().as_ref(),
        b"/proj/README.md".as_slice()
    );
    let blob = readme.blob_info(&cancel).await.unwrap().unwrap();
    assert_eq!(blob.content_type, "text/markdown");
}

#[tokio::test]
async fn local_backend_rejects_escaping_keys() {
    let dir = TempDir::new().unwrap();
    let storage = LocalBlobStorage::new(dir.path()).unwrap();
    let err = storage.get_metadata("../outside.txt").await.unwrap_err();
    let err: VfsError = err.into();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
}
