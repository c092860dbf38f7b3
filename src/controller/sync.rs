/*!
 * Sync Layer
 * Outermost layer of every chain: tracks dirtiness and runs the sync engine
 */

use super::handles::{ReadHandle, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::state::{ChainContext, ChainState};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsResult, SyncError};
use crate::sync::{engine, SyncOptions, SyncOutcome};

pub struct SyncController {
    ctx: ChainContext,
    inner: Box<dyn Controller>,
}

impl SyncController {
    pub fn new(ctx: ChainContext, inner: Box<dyn Controller>) -> Self {
        Self { ctx, inner }
    }

    #[inline]
    pub fn state(&self) -> ChainState {
        self.ctx.status.get()
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    /// Read and write handles currently open against this mount point
    pub fn open_streams(&self) -> usize {
        self.ctx.streams.count()
    }

    /// Commit this mount point's pending state to its backing entry
    pub fn sync(&self, options: &SyncOptions) -> Result<SyncOutcome, SyncError> {
        engine::run(self.inner.as_ref(), &self.ctx, options)
    }

    fn refresh(&self) {
        if self.inner.is_touched() {
            self.ctx.status.transition(ChainState::Clean, ChainState::Dirty);
        } else {
            self.ctx.status.transition(ChainState::Dirty, ChainState::Clean);
        }
    }
}

impl Controller for SyncController {
    fn mount_point(&self) -> &MountPoint {
        &self.ctx.mount_point
    }

    fn mount(&self, access: &AccessOptions) -> FsResult<()> {
        self.inner.mount(access)
    }

    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        self.inner.stat(name, access)
    }

    fn entries(&self, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.inner.entries(access)
    }

    fn list(&self, dir: &EntryName, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.inner.list(dir, access)
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle> {
        self.inner.open_read(name, access)
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        let handle = self.inner.begin_write(name, access)?;
        self.refresh();
        Ok(handle)
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        let result = self.inner.delete(name, options);
        self.refresh();
        result
    }

    fn is_touched(&self) -> bool {
        self.inner.is_touched()
    }

    fn prepare_sync(&self, options: &SyncOptions) -> FsResult<Option<SyncSnapshot>> {
        self.inner.prepare_sync(options)
    }

    fn commit_backing(&self, snapshot: &SyncSnapshot, options: &SyncOptions) -> FsResult<()> {
        self.inner.commit_backing(snapshot, options)
    }

    fn complete_sync(&self, snapshot: SyncSnapshot) -> FsResult<()> {
        self.inner.complete_sync(snapshot)
    }

    fn abort_sync(&self, snapshot: SyncSnapshot) {
        self.inner.abort_sync(snapshot)
    }

    fn unmount(&self) -> usize {
        self.inner.unmount()
    }

    fn shed_cache(&self) -> usize {
        self.inner.shed_cache()
    }
}
