/*!
 * Lock Layer
 * Per mount point reader/writer lock and the mutation gate around syncs
 *
 * Reads share the lock; pending-state mutations and the prepare and
 * completion steps of a sync hold it exclusively. The lock is reentrant
 * per thread, and a thread that is the only reader may upgrade.
 */

use super::handles::{ReadHandle, WriteHandle};
use super::options::{AccessOptions, DeleteOptions, LockWait};
use super::state::{ChainContext, ChainState};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use crate::sync::SyncOptions;
use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

#[derive(Default)]
struct Holders {
    writer: Option<ThreadId>,
    writer_depth: usize,
    readers: HashMap<ThreadId, usize, RandomState>,
}

impl Holders {
    fn can_read(&self, me: ThreadId) -> bool {
        self.writer.map_or(true, |owner| owner == me)
    }

    fn can_write(&self, me: ThreadId) -> bool {
        self.can_read(me) && self.readers.keys().all(|reader| *reader == me)
    }
}

/// Reentrant reader/writer lock with bounded or non-blocking waits
pub struct MountLock {
    holders: Mutex<Holders>,
    released: Condvar,
}

impl MountLock {
    pub fn new() -> Self {
        Self {
            holders: Mutex::new(Holders::default()),
            released: Condvar::new(),
        }
    }

    pub fn read(&self, wait: LockWait) -> FsResult<MountGuard<'_>> {
        self.acquire(wait, false)
    }

    pub fn write(&self, wait: LockWait) -> FsResult<MountGuard<'_>> {
        self.acquire(wait, true)
    }

    /// Whether any thread holds the lock
    pub fn is_held(&self) -> bool {
        let holders = self.holders.lock();
        holders.writer.is_some() || !holders.readers.is_empty()
    }

    fn acquire(&self, wait: LockWait, exclusive: bool) -> FsResult<MountGuard<'_>> {
        let me = thread::current().id();
        let deadline = wait.deadline();
        let mut holders = self.holders.lock();

        loop {
            let free = if exclusive {
                holders.can_write(me)
            } else {
                holders.can_read(me)
            };
            if free {
                break;
            }
            match wait {
                LockWait::NonBlocking => {
                    return Err(FsError::Busy("mount point is locked".to_string()));
                }
                LockWait::Blocking { .. } => match deadline {
                    Some(deadline) => {
                        if self.released.wait_until(&mut holders, deadline).timed_out() {
                            let free = if exclusive {
                                holders.can_write(me)
                            } else {
                                holders.can_read(me)
                            };
                            if !free {
                                return Err(FsError::Busy(
                                    "timed out waiting for mount point lock".to_string(),
                                ));
                            }
                        }
                    }
                    None => self.released.wait(&mut holders),
                },
            }
        }

        if exclusive {
            holders.writer = Some(me);
            holders.writer_depth += 1;
        } else {
            *holders.readers.entry(me).or_insert(0) += 1;
        }
        Ok(MountGuard {
            lock: self,
            exclusive,
        })
    }

    fn release(&self, exclusive: bool) {
        let me = thread::current().id();
        let mut holders = self.holders.lock();
        if exclusive {
            holders.writer_depth = holders.writer_depth.saturating_sub(1);
            if holders.writer_depth == 0 {
                holders.writer = None;
            }
        } else if let Some(depth) = holders.readers.get_mut(&me) {
            *depth -= 1;
            if *depth == 0 {
                holders.readers.remove(&me);
            }
        }
        self.released.notify_all();
    }
}

impl Default for MountLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Held share of a `MountLock`, released on drop
#[must_use]
pub struct MountGuard<'a> {
    lock: &'a MountLock,
    exclusive: bool,
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.exclusive);
    }
}

pub struct LockController {
    ctx: ChainContext,
    inner: Box<dyn Controller>,
    lock: MountLock,
}

impl LockController {
    pub fn new(ctx: ChainContext, inner: Box<dyn Controller>) -> Self {
        Self {
            ctx,
            inner,
            lock: MountLock::new(),
        }
    }

    fn shared(&self, wait: LockWait) -> FsResult<MountGuard<'_>> {
        self.lock.read(wait).map_err(|e| self.annotate(e))
    }

    /// Exclusive lock for a mutation, taken only outside a sync
    fn exclusive(&self, wait: LockWait) -> FsResult<MountGuard<'_>> {
        loop {
            self.ctx
                .status
                .wait_until_not_syncing(wait, &self.ctx.mount_point)?;
            let guard = self.lock.write(wait).map_err(|e| self.annotate(e))?;
            if self.ctx.status.get() != ChainState::Syncing {
                return Ok(guard);
            }
            drop(guard);
        }
    }

    fn annotate(&self, e: FsError) -> FsError {
        match e {
            FsError::Busy(reason) => FsError::Busy(format!("{}: {}", self.ctx.mount_point, reason)),
            other => other,
        }
    }

    fn settle(&self) {
        let next = if self.inner.is_touched() {
            ChainState::Dirty
        } else {
            ChainState::Clean
        };
        self.ctx.status.set(next);
    }
}

impl Controller for LockController {
    fn mount_point(&self) -> &MountPoint {
        self.inner.mount_point()
    }

    fn mount(&self, access: &AccessOptions) -> FsResult<()> {
        let _guard = self.shared(access.wait)?;
        self.inner.mount(access)
    }

    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        let _guard = self.shared(access.wait)?;
        self.inner.stat(name, access)
    }

    fn entries(&self, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        let _guard = self.shared(access.wait)?;
        self.inner.entries(access)
    }

    fn list(&self, dir: &EntryName, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        let _guard = self.shared(access.wait)?;
        self.inner.list(dir, access)
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle> {
        let _guard = self.shared(access.wait)?;
        self.inner.open_read(name, access)
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        let _guard = self.exclusive(access.wait)?;
        self.inner.begin_write(name, access)
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        let _guard = self.exclusive(options.access.wait)?;
        self.inner.delete(name, options)
    }

    fn is_touched(&self) -> bool {
        self.inner.is_touched()
    }

    fn prepare_sync(&self, options: &SyncOptions) -> FsResult<Option<SyncSnapshot>> {
        let _guard = self.lock.write(options.wait).map_err(|e| self.annotate(e))?;
        if self.ctx.status.get() == ChainState::Syncing {
            return Err(FsError::Busy(format!("{} is already syncing", self.ctx.mount_point)));
        }
        let open = self.ctx.streams.count();
        if open > 0 {
            return Err(FsError::Busy(format!(
                "{} has {} open streams",
                self.ctx.mount_point, open
            )));
        }

        let snapshot = self.inner.prepare_sync(options)?;
        if snapshot.is_some() {
            self.ctx.status.set(ChainState::Syncing);
        }
        Ok(snapshot)
    }

    fn commit_backing(&self, snapshot: &SyncSnapshot, options: &SyncOptions) -> FsResult<()> {
        self.inner.commit_backing(snapshot, options)
    }

    fn complete_sync(&self, snapshot: SyncSnapshot) -> FsResult<()> {
        let result = match self.lock.write(LockWait::forever()) {
            Ok(_guard) => self.inner.complete_sync(snapshot),
            Err(e) => Err(e),
        };
        self.settle();
        result
    }

    fn abort_sync(&self, snapshot: SyncSnapshot) {
        match self.lock.write(LockWait::forever()) {
            Ok(_guard) => self.inner.abort_sync(snapshot),
            Err(e) => warn!(mount_point = %self.ctx.mount_point, error = %e, "Failed to lock for sync abort"),
        }
        self.settle();
    }

    fn unmount(&self) -> usize {
        let discarded = match self.lock.write(LockWait::forever()) {
            Ok(_guard) => self.inner.unmount(),
            Err(e) => {
                warn!(mount_point = %self.ctx.mount_point, error = %e, "Failed to lock for unmount");
                0
            }
        };
        debug!(mount_point = %self.ctx.mount_point, discarded, "Chain unmounted");
        discarded
    }

    fn shed_cache(&self) -> usize {
        self.inner.shed_cache()
    }
}
