/*!
 * Nested Sync Tests
 * Inner-before-outer commit ordering across nested archives
 */

use crate::support::{addr, manager, manager_with, mount_point, name, names, test_config, zip_bytes, zip_entry};
use fedfs_kernel::controller::Controller;
use fedfs_kernel::{ChainState, KernelConfig, MemStorage, SyncOptions, SyncOutcome, SyncStep};
use std::io::Write;
use pretty_assertions::assert_eq;

#[test]
fn test_sync_all_commits_inner_before_outer() {
    let storage = MemStorage::new();
    let nested = zip_bytes(&[("old.txt", b"old")]);
    storage
        .insert(&name("a.zip"), zip_bytes(&[("readme.txt", b"outer"), ("nested.zip", &nested[..])]))
        .unwrap();
    let m = manager(&storage);

    m.write(&addr("zip:zip:mem:/a.zip!/nested.zip!/x.txt"), b"inner bytes")
        .unwrap();
    let writes_before = storage.write_count();
    m.sync_all(&SyncOptions::default()).unwrap();

    // One host write: the outer archive, after the inner one reached it
    assert_eq!(storage.write_count(), writes_before + 1);

    let outer = storage.get(&name("a.zip")).unwrap();
    assert_eq!(zip_entry(outer.clone(), "readme.txt").unwrap().as_ref(), b"outer");
    let inner = zip_entry(outer, "nested.zip").unwrap();
    assert_eq!(zip_entry(inner.clone(), "x.txt").unwrap().as_ref(), b"inner bytes");
    assert_eq!(zip_entry(inner, "old.txt").unwrap().as_ref(), b"old");
}

#[test]
fn test_new_nested_archives_created_by_sync() {
    let storage = MemStorage::new();
    let m = manager(&storage);

    m.write(&addr("tar:zip:mem:/new.zip!/inner.tar!/dir/a.txt"), b"a")
        .unwrap();
    m.write(&addr("zip:mem:/new.zip!/top.txt"), b"top").unwrap();
    m.sync_all(&SyncOptions::default()).unwrap();

    let reread = manager(&storage);
    assert_eq!(
        reread
            .read(&addr("tar:zip:mem:/new.zip!/inner.tar!/dir/a.txt"))
            .unwrap()
            .as_ref(),
        b"a"
    );
    assert_eq!(
        names(&reread.entries(&mount_point("zip:mem:/new.zip!/")).unwrap()),
        vec!["inner.tar", "top.txt"]
    );
}

#[test]
fn test_sync_subtree_reports_outcomes() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    m.write(&addr("zip:zip:mem:/a.zip!/b.zip!/x"), b"x").unwrap();

    let outcomes = m
        .sync(&mount_point("zip:mem:/a.zip!/"), &SyncOptions::default())
        .unwrap();
    let reported: Vec<(String, SyncOutcome)> = outcomes
        .into_iter()
        .map(|(mp, outcome)| (mp.to_string(), outcome))
        .collect();
    assert_eq!(
        reported,
        vec![
            ("zip:zip:mem:/a.zip!/b.zip!/".to_string(), SyncOutcome::Committed { entries: 1 }),
            ("zip:mem:/a.zip!/".to_string(), SyncOutcome::Committed { entries: 1 }),
        ]
    );
}

#[test]
fn test_sync_is_noop_when_clean() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"x")]))
        .unwrap();
    let m = manager(&storage);
    let before = storage.get(&name("a.zip")).unwrap();

    assert_eq!(m.read(&addr("zip:mem:/a.zip!/x.txt")).unwrap().as_ref(), b"x");
    let outcomes = m
        .sync(&mount_point("zip:mem:/a.zip!/"), &SyncOptions::default().keep_idle())
        .unwrap();
    assert_eq!(outcomes[0].1, SyncOutcome::Clean);
    assert_eq!(storage.write_count(), 0);
    assert_eq!(storage.get(&name("a.zip")).unwrap(), before);
}

#[test]
fn test_failed_commit_keeps_pending_state() {
    let storage = MemStorage::new();
    // A file where the backing archive's parent directory should be
    storage.insert(&name("blocked"), &b"file"[..]).unwrap();
    let m = manager(&storage);

    m.write(&addr("zip:mem:/blocked/a.zip!/x.txt"), b"x").unwrap();
    let error = m.sync_all(&SyncOptions::default()).unwrap_err();
    assert_eq!(error.errors.len(), 1);

    let failure = error.for_mount_point("zip:mem:/blocked/a.zip!/").unwrap();
    assert_eq!(failure.step, SyncStep::Commit);
    assert_eq!(failure.entries, vec!["x.txt".to_string()]);

    // Pending content survives and stays readable
    assert_eq!(m.read(&addr("zip:mem:/blocked/a.zip!/x.txt")).unwrap().as_ref(), b"x");
    let info = m
        .mounts()
        .into_iter()
        .find(|info| info.mount_point == mount_point("zip:mem:/blocked/a.zip!/"))
        .unwrap();
    assert!(info.touched);
    assert_eq!(info.state, ChainState::Dirty);
}

#[test]
fn test_shutdown_keeps_ancestors_of_dirty_mount_point() {
    let storage = MemStorage::new();
    let config = KernelConfig {
        non_blocking: true,
        lock_timeout: None,
        ..test_config()
    };
    let m = manager_with(&storage, config);
    m.write(&addr("zip:mem:/a.zip!/x.txt"), b"x").unwrap();
    let handle = m.open_read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();

    let error = m.shutdown(&m.sync_options()).unwrap_err();
    assert_eq!(error.errors[0].step, SyncStep::Quiesce);
    let mounts: Vec<String> = m.mounts().iter().map(|info| info.mount_point.to_string()).collect();
    assert_eq!(mounts, vec!["mem:/", "zip:mem:/a.zip!/"]);

    drop(handle);
    m.sync_all(&m.sync_options()).unwrap();
    let stored = storage.get(&name("a.zip")).unwrap();
    assert_eq!(zip_entry(stored, "x.txt").unwrap().as_ref(), b"x");
}

#[test]
fn test_missing_parent_chain_is_rebuilt() {
    let storage = MemStorage::new();
    let m = manager(&storage);
    let chain = m.resolve(&mount_point("zip:zip:mem:/a.zip!/b.zip!/")).unwrap();
    m.unmount(&mount_point("zip:mem:/a.zip!/"), false).unwrap();
    assert!(m
        .mounts()
        .iter()
        .all(|info| info.mount_point.to_string() != "zip:mem:/a.zip!/"));

    let mut writer = chain.begin_write(&name("x.txt"), &m.access()).unwrap();
    writer.write_all(b"orphan").unwrap();
    writer.close().unwrap();
    assert_eq!(
        chain.sync(&SyncOptions::default()).unwrap(),
        SyncOutcome::Committed { entries: 1 }
    );

    // The rebuilt parent holds the nested archive until it is synced too
    assert!(m.mounts().iter().any(|info| info.touched));
    m.sync_all(&SyncOptions::default()).unwrap();
    let outer = storage.get(&name("a.zip")).unwrap();
    let nested = zip_entry(outer, "b.zip").unwrap();
    assert_eq!(zip_entry(nested, "x.txt").unwrap().as_ref(), b"orphan");
}
