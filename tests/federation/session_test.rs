/*!
 * Session Tests
 * Pending state visibility within one session, before any sync
 */

use crate::support::{addr, manager, manager_with, mount_point, name, names, test_config, zip_bytes};
use fedfs_kernel::{FsError, KernelConfig, MemStorage, PoolConfig, ReadOrigin, SyncOptions};
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_write_then_read_skips_backing() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("old.txt", b"old")]))
        .unwrap();
    let m = manager(&storage);

    m.write(&addr("zip:mem:/a.zip!/new.txt"), b"fresh").unwrap();
    let reads_after_mount = storage.read_count();

    let handle = m.open_read(&addr("zip:mem:/a.zip!/new.txt")).unwrap();
    assert_eq!(handle.origin(), ReadOrigin::Pending);
    assert_eq!(handle.read_all().unwrap().as_ref(), b"fresh");
    assert_eq!(storage.read_count(), reads_after_mount);
    assert_eq!(storage.write_count(), 0);
}

#[test]
fn test_repeated_reads_hit_cache() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"cached")]))
        .unwrap();
    let m = manager(&storage);
    let x = addr("zip:mem:/a.zip!/x.txt");

    assert_eq!(m.open_read(&x).unwrap().origin(), ReadOrigin::Backing);
    let second = m.open_read(&x).unwrap();
    assert_eq!(second.origin(), ReadOrigin::Cache);
    assert_eq!(second.read_all().unwrap().as_ref(), b"cached");

    // A pending write supersedes the cached copy
    m.write(&x, b"new").unwrap();
    let third = m.open_read(&x).unwrap();
    assert_eq!(third.origin(), ReadOrigin::Pending);
    assert_eq!(third.read_all().unwrap().as_ref(), b"new");
}

#[test]
fn test_begin_write_visible_until_deleted() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    let mp = mount_point("zip:mem:/a.zip!/");
    let e = addr("zip:mem:/a.zip!/dir/e.txt");

    let mut handle = m.begin_write(&e).unwrap();
    assert_eq!(names(&m.entries(&mp).unwrap()), vec!["dir", "dir/e.txt"]);
    assert_eq!(m.stat(&e).unwrap().unwrap().size, 0);

    m.delete(&e, false).unwrap();
    assert_eq!(names(&m.entries(&mp).unwrap()), Vec::<String>::new());

    // Closing the cancelled writer does not resurrect the entry
    handle.write_all(b"late").unwrap();
    handle.close().unwrap();
    assert!(m.stat(&e).unwrap().is_none());
    assert!(!m.mounts().iter().any(|info| info.touched));
}

#[test]
fn test_read_while_writer_open_is_busy() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    let e = addr("zip:mem:/a.zip!/e.txt");

    let mut handle = m.begin_write(&e).unwrap();
    handle.write_all(b"partial").unwrap();
    assert!(matches!(m.read(&e), Err(FsError::Busy(_))));

    handle.close().unwrap();
    assert_eq!(m.read(&e).unwrap().as_ref(), b"partial");
}

#[test]
fn test_dropped_writer_commits() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    let e = addr("zip:mem:/a.zip!/e.txt");
    {
        let mut handle = m.begin_write(&e).unwrap();
        handle.write_all(b"dropped").unwrap();
    }
    assert_eq!(m.read(&e).unwrap().as_ref(), b"dropped");
}

#[test]
fn test_hierarchy_rules() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    m.write(&addr("zip:mem:/a.zip!/dir/x.txt"), b"x").unwrap();

    assert!(matches!(
        m.write(&addr("zip:mem:/a.zip!/dir"), b"clash"),
        Err(FsError::EntryCollision(_))
    ));
    assert!(matches!(
        m.write(&addr("zip:mem:/a.zip!/dir/x.txt/below"), b"clash"),
        Err(FsError::EntryCollision(_))
    ));
    assert!(matches!(
        m.delete(&addr("zip:mem:/a.zip!/dir"), false),
        Err(FsError::DirectoryNotEmpty(_))
    ));
    assert!(matches!(
        m.delete(&addr("zip:mem:/a.zip!/missing"), false),
        Err(FsError::NoSuchEntry(_))
    ));

    m.delete(&addr("zip:mem:/a.zip!/dir"), true).unwrap();
    assert!(m.entries(&mount_point("zip:mem:/a.zip!/")).unwrap().is_empty());
}

#[test]
fn test_delete_known_entry_then_sync() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("keep.txt", b"k"), ("drop.txt", b"d")]))
        .unwrap();
    let m = manager(&storage);

    m.delete(&addr("zip:mem:/a.zip!/drop.txt"), false).unwrap();
    assert!(matches!(
        m.read(&addr("zip:mem:/a.zip!/drop.txt")),
        Err(FsError::NoSuchEntry(_))
    ));
    m.sync_all(&SyncOptions::default()).unwrap();

    let reread = manager(&storage);
    assert_eq!(
        names(&reread.entries(&mount_point("zip:mem:/a.zip!/")).unwrap()),
        vec!["keep.txt"]
    );
}

#[test]
fn test_list_directory() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    m.write(&addr("zip:mem:/a.zip!/d/one"), b"1").unwrap();
    m.write(&addr("zip:mem:/a.zip!/d/sub/two"), b"2").unwrap();
    m.write(&addr("zip:mem:/a.zip!/top"), b"t").unwrap();

    assert_eq!(names(&m.list(&addr("zip:mem:/a.zip!/d")).unwrap()), vec!["d/one", "d/sub"]);
    assert_eq!(names(&m.list(&addr("zip:mem:/a.zip!/")).unwrap()), vec!["d", "top"]);
}

fn small_pool(max_buffers: usize) -> KernelConfig {
    KernelConfig {
        pool: PoolConfig {
            max_buffers,
            ..PoolConfig::default()
        },
        ..test_config()
    }
}

#[test]
fn test_cache_leaves_pool_for_writes() {
    let storage = MemStorage::new();
    let files: Vec<(String, Vec<u8>)> = (0..40).map(|i| (format!("e{}.txt", i), vec![b'x'])).collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(entry, data)| (entry.as_str(), data.as_slice()))
        .collect();
    storage.insert(&name("a.zip"), zip_bytes(&refs)).unwrap();
    let m = manager_with(&storage, small_pool(16));

    for (entry, _) in &files {
        let data = m.read(&addr(&format!("zip:mem:/a.zip!/{}", entry))).unwrap();
        assert_eq!(data.as_ref(), b"x");
    }
    let cached = m.pool_stats().outstanding;
    assert!(cached > 0 && cached <= 8, "cache holds {} buffers", cached);
    assert_eq!(
        m.open_read(&addr("zip:mem:/a.zip!/e0.txt")).unwrap().origin(),
        ReadOrigin::Cache
    );

    // Unrelated mount points can still write and sync
    m.write(&addr("zip:mem:/other.zip!/y.txt"), b"y").unwrap();
    m.sync_all(&SyncOptions::default().keep_idle()).unwrap();
    assert!(storage.get(&name("other.zip")).is_some());

    assert!(m.shed_caches() > 0);
    assert!(m.pool_stats().outstanding < cached);
}

#[test]
fn test_exhausted_pool_serves_reads_uncached() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"plain")]))
        .unwrap();
    let m = manager_with(&storage, small_pool(2));

    let _first = m.begin_write(&addr("zip:mem:/b.zip!/one")).unwrap();
    let _second = m.begin_write(&addr("zip:mem:/b.zip!/two")).unwrap();
    assert_eq!(m.pool_stats().outstanding, 2);

    let handle = m.open_read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();
    assert_eq!(handle.origin(), ReadOrigin::Backing);
    assert_eq!(handle.read_all().unwrap().as_ref(), b"plain");
    assert_eq!(m.pool_stats().outstanding, 2);
}
