/*!
 * Local Storage Tests
 * Archives on a real host directory
 */

use crate::support::{addr, mount_point, names, test_config, zip_entry};
use bytes::Bytes;
use fedfs_kernel::{FsManager, LocalStorage, SyncOptions};
use pretty_assertions::assert_eq;

fn local_manager(root: &std::path::Path) -> FsManager {
    FsManager::builder()
        .with_config(test_config())
        .with_storage("file", LocalStorage::new(root))
        .build()
        .unwrap()
}

#[test]
fn test_sync_writes_archive_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let m = local_manager(dir.path());

    m.write(&addr("zip:file:/out/bundle.zip!/hello.txt"), b"hello disk")
        .unwrap();
    assert!(!dir.path().join("out/bundle.zip").exists());
    m.sync_all(&SyncOptions::default()).unwrap();

    let on_disk = std::fs::read(dir.path().join("out/bundle.zip")).unwrap();
    assert_eq!(
        zip_entry(Bytes::from(on_disk), "hello.txt").unwrap().as_ref(),
        b"hello disk"
    );

    let reread = local_manager(dir.path());
    assert_eq!(
        names(&reread.entries(&mount_point("zip:file:/out/bundle.zip!/")).unwrap()),
        vec!["hello.txt"]
    );
}

#[test]
fn test_plain_host_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plain.txt"), b"plain").unwrap();
    let m = local_manager(dir.path());

    assert_eq!(m.read(&addr("file:/plain.txt")).unwrap().as_ref(), b"plain");
    m.write(&addr("file:/sub/new.txt"), b"new").unwrap();
    assert_eq!(std::fs::read(dir.path().join("sub/new.txt")).unwrap(), b"new");

    m.delete(&addr("file:/plain.txt"), false).unwrap();
    assert!(!dir.path().join("plain.txt").exists());
}
