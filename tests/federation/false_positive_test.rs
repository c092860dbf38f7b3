/*!
 * False Positive Tests
 * Files named like archives that are not archives fall back to plain files
 */

use crate::support::{addr, manager, mount_point, name, zip_bytes};
use fedfs_kernel::{FsError, MemStorage, SyncOptions};
use pretty_assertions::assert_eq;

fn plain_storage() -> MemStorage {
    let storage = MemStorage::new();
    storage
        .insert(&name("notes.zip"), &b"just some text"[..])
        .unwrap();
    storage
}

#[test]
fn test_plain_file_served_as_root_entry() {
    let storage = plain_storage();
    let m = manager(&storage);
    let root = addr("zip:mem:/notes.zip!/");

    assert_eq!(m.read(&root).unwrap().as_ref(), b"just some text");
    let meta = m.stat(&root).unwrap().unwrap();
    assert!(meta.is_file());
    assert_eq!(meta.size, 14);
    assert!(m.entries(&mount_point("zip:mem:/notes.zip!/")).unwrap().is_empty());
}

#[test]
fn test_plain_file_has_no_children() {
    let storage = plain_storage();
    let m = manager(&storage);

    assert!(matches!(
        m.read(&addr("zip:mem:/notes.zip!/x.txt")),
        Err(FsError::NoSuchEntry(_))
    ));
    assert!(!m.exists(&addr("zip:mem:/notes.zip!/x.txt")).unwrap());
    assert!(matches!(
        m.write(&addr("zip:mem:/notes.zip!/x.txt"), b"x"),
        Err(FsError::EntryCollision(_))
    ));
    assert!(matches!(
        m.delete(&addr("zip:mem:/notes.zip!/x.txt"), false),
        Err(FsError::NotSupported(_))
    ));
}

#[test]
fn test_root_write_replaces_backing() {
    let storage = plain_storage();
    let m = manager(&storage);

    m.write(&addr("zip:mem:/notes.zip!/"), b"rewritten").unwrap();
    assert_eq!(storage.get(&name("notes.zip")).unwrap().as_ref(), b"rewritten");
    // Nothing pending: the write went straight to the parent
    assert!(m.mounts().iter().all(|info| !info.touched));
}

#[test]
fn test_detected_address_of_plain_file() {
    let storage = plain_storage();
    storage
        .insert(&name("real.zip"), zip_bytes(&[("inside.txt", b"archived")]))
        .unwrap();
    let m = manager(&storage);

    let plain = m.detect("mem:/notes.zip").unwrap();
    assert_eq!(plain.to_string(), "zip:mem:/notes.zip!/");
    assert_eq!(m.read(&plain).unwrap().as_ref(), b"just some text");

    let real = m.detect("mem:/real.zip/inside.txt").unwrap();
    assert_eq!(m.read(&real).unwrap().as_ref(), b"archived");
    m.sync_all(&SyncOptions::default()).unwrap();
}
