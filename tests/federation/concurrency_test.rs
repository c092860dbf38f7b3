/*!
 * Concurrency Tests
 * Parallel sessions, stream quiescence and sync cancellation
 */

use crate::support::{
    addr, manager, manager_with, mount_point, name, names, test_config, zip_bytes, zip_entry,
};
use fedfs_kernel::{
    CancelToken, EntryInfo, EntryMeta, EntryName, FsError, FsManager, FsResult, HostStorage,
    KernelConfig, MemStorage, SyncOptions, SyncStep,
};
use pretty_assertions::assert_eq;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_parallel_writers_then_sync_all() {
    let storage = MemStorage::new();
    let m = Arc::new(manager(&storage));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for j in 0..8 {
                    let address = addr(&format!("zip:mem:/shared.zip!/t{}/e{}.txt", i, j));
                    m.write(&address, format!("{}-{}", i, j).as_bytes()).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    m.sync_all(&SyncOptions::default()).unwrap();

    let reread = manager(&storage);
    let entries = reread.entries(&mount_point("zip:mem:/shared.zip!/")).unwrap();
    assert_eq!(entries.iter().filter(|info| info.meta.is_file()).count(), 32);
    assert_eq!(
        reread.read(&addr("zip:mem:/shared.zip!/t3/e7.txt")).unwrap().as_ref(),
        b"3-7"
    );
}

#[test]
fn test_concurrent_readers_share_mount_point() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"shared")]))
        .unwrap();
    let m = Arc::new(manager(&storage));

    // An open handle does not hold the mount point lock
    let held = m.open_read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..16 {
                    let data = m.read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();
                    assert_eq!(data.as_ref(), b"shared");
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(held.read_all().unwrap().as_ref(), b"shared");
}

#[test]
fn test_non_blocking_sync_busy_with_open_stream() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"x")]))
        .unwrap();
    let config = KernelConfig {
        reap_on_start: false,
        ..KernelConfig::non_blocking()
    };
    let m = manager_with(&storage, config);

    let handle = m.open_read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();
    m.write(&addr("zip:mem:/a.zip!/y.txt"), b"y").unwrap();

    let error = m.sync_all(&m.sync_options()).unwrap_err();
    let failure = error.for_mount_point("zip:mem:/a.zip!/").unwrap();
    assert_eq!(failure.step, SyncStep::Quiesce);
    assert!(failure.is_busy());
    assert_eq!(storage.write_count(), 0);

    drop(handle);
    m.sync_all(&m.sync_options()).unwrap();
    assert_eq!(storage.write_count(), 1);
}

#[test]
fn test_sync_waits_for_streams() {
    let storage = MemStorage::new();
    storage
        .insert(&name("a.zip"), zip_bytes(&[("x.txt", b"x")]))
        .unwrap();
    let m = manager(&storage);

    let handle = m.open_read(&addr("zip:mem:/a.zip!/x.txt")).unwrap();
    m.write(&addr("zip:mem:/a.zip!/y.txt"), b"y").unwrap();

    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        drop(handle);
    });

    let options = SyncOptions::default().wait_for_streams();
    m.sync_all(&options).unwrap();
    closer.join().unwrap();

    let reread = manager(&storage);
    assert_eq!(
        names(&reread.entries(&mount_point("zip:mem:/a.zip!/")).unwrap()),
        vec!["x.txt", "y.txt"]
    );
}

#[test]
fn test_cancelled_sync_keeps_pending_state() {
    let storage = MemStorage::new();
    let m = manager_with(&storage, test_config());
    m.write(&addr("zip:mem:/a.zip!/x.txt"), b"x").unwrap();

    let token = CancelToken::new();
    token.cancel();
    let error = m
        .sync(
            &mount_point("zip:mem:/a.zip!/"),
            &SyncOptions::default().with_cancel(token),
        )
        .unwrap_err();
    assert_eq!(error.errors[0].step, SyncStep::Cancelled);
    assert_eq!(storage.write_count(), 0);

    // Retrying without the token commits what was pending
    m.sync_all(&SyncOptions::default()).unwrap();
    assert_eq!(storage.write_count(), 1);
}

/// Host storage whose next write parks until the test lets it through
#[derive(Clone)]
struct GatedStorage {
    inner: MemStorage,
    armed: Arc<AtomicBool>,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl GatedStorage {
    fn new(inner: MemStorage) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(false)),
            entered: Arc::new(Barrier::new(2)),
            release: Arc::new(Barrier::new(2)),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl HostStorage for GatedStorage {
    fn name(&self) -> &str {
        "gated"
    }

    fn stat(&self, name: &EntryName) -> FsResult<Option<EntryMeta>> {
        self.inner.stat(name)
    }

    fn open_read(&self, name: &EntryName) -> FsResult<Box<dyn Read + Send>> {
        self.inner.open_read(name)
    }

    fn write_replace(&self, name: &EntryName, content: &mut dyn Read) -> FsResult<u64> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.write_replace(name, content)
    }

    fn delete(&self, name: &EntryName, recursive: bool) -> FsResult<()> {
        self.inner.delete(name, recursive)
    }

    fn list(&self, dir: &EntryName) -> FsResult<Vec<EntryInfo>> {
        self.inner.list(dir)
    }
}

fn gated_manager(gate: &GatedStorage, config: KernelConfig) -> Arc<FsManager> {
    let m = FsManager::builder()
        .with_config(config)
        .with_storage("mem", gate.clone())
        .build()
        .unwrap();
    Arc::new(m)
}

/// Start syncing `zip:mem:/a.zip!/` and return once it is parked in commit
fn park_sync(m: &Arc<FsManager>, gate: &GatedStorage) -> thread::JoinHandle<()> {
    gate.arm();
    let syncing = Arc::clone(m);
    let handle = thread::spawn(move || {
        syncing
            .sync(&mount_point("zip:mem:/a.zip!/"), &syncing.sync_options())
            .unwrap();
    });
    gate.entered.wait();
    handle
}

#[test]
fn test_mutation_during_sync_non_blocking_is_busy() {
    let storage = MemStorage::new();
    let gate = GatedStorage::new(storage.clone());
    let config = KernelConfig {
        non_blocking: true,
        lock_timeout: None,
        ..test_config()
    };
    let m = gated_manager(&gate, config);
    m.write(&addr("zip:mem:/a.zip!/x.txt"), b"x").unwrap();

    let sync = park_sync(&m, &gate);
    assert!(matches!(
        m.write(&addr("zip:mem:/a.zip!/late.txt"), b"late"),
        Err(FsError::Busy(_))
    ));
    assert!(matches!(
        m.delete(&addr("zip:mem:/a.zip!/x.txt"), false),
        Err(FsError::Busy(_))
    ));
    // Reads are not gated by the sync
    assert_eq!(m.read(&addr("zip:mem:/a.zip!/x.txt")).unwrap().as_ref(), b"x");

    gate.release.wait();
    sync.join().unwrap();

    let stored = storage.get(&name("a.zip")).unwrap();
    assert_eq!(zip_entry(stored.clone(), "x.txt").unwrap().as_ref(), b"x");
    assert!(zip_entry(stored, "late.txt").is_none());
    assert!(!m.mounts().iter().any(|info| info.touched));
}

#[test]
fn test_mutation_during_sync_waits_when_blocking() {
    let storage = MemStorage::new();
    let gate = GatedStorage::new(storage.clone());
    let m = gated_manager(&gate, test_config());
    m.write(&addr("zip:mem:/a.zip!/x.txt"), b"x").unwrap();

    let sync = park_sync(&m, &gate);
    let writing = Arc::clone(&m);
    let writer = thread::spawn(move || writing.write(&addr("zip:mem:/a.zip!/late.txt"), b"late"));
    thread::sleep(Duration::from_millis(50));
    assert!(!writer.is_finished());

    gate.release.wait();
    sync.join().unwrap();
    writer.join().unwrap().unwrap();

    // The late write missed the commit and stays pending
    let stored = storage.get(&name("a.zip")).unwrap();
    assert!(zip_entry(stored, "late.txt").is_none());
    assert!(m.mounts().iter().any(|info| info.touched));

    m.sync_all(&SyncOptions::default()).unwrap();
    let stored = storage.get(&name("a.zip")).unwrap();
    assert_eq!(zip_entry(stored, "late.txt").unwrap().as_ref(), b"late");
}

#[test]
fn test_nested_reads_alongside_parent_writes() {
    let storage = MemStorage::new();
    let nested = zip_bytes(&[("x.txt", b"inner")]);
    storage
        .insert(&name("a.zip"), zip_bytes(&[("nested.zip", &nested[..])]))
        .unwrap();
    let m = Arc::new(manager(&storage));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for j in 0..16 {
                    if i % 2 == 0 {
                        let data = m.read(&addr("zip:zip:mem:/a.zip!/nested.zip!/x.txt")).unwrap();
                        assert_eq!(data.as_ref(), b"inner");
                    } else {
                        let address = addr(&format!("zip:mem:/a.zip!/w{}-{}.txt", i, j));
                        m.write(&address, b"outer").unwrap();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    m.sync_all(&SyncOptions::default()).unwrap();
    let stored = storage.get(&name("a.zip")).unwrap();
    assert_eq!(zip_entry(stored.clone(), "w1-15.txt").unwrap().as_ref(), b"outer");
    assert!(zip_entry(stored, "nested.zip").is_some());
}
