/*!
 * Plain File Controller
 * Serves a backing entry that turned out not to be an archive as a single file
 */

use super::backing::BackingStore;
use super::handles::{ReadHandle, ReadOrigin, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::state::{ChainContext, ChainState};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use crate::sync::SyncOptions;
use std::sync::Arc;

/// The root entry is the backing file; nothing else exists
pub struct PlainFileController {
    ctx: ChainContext,
    backing: Arc<dyn BackingStore>,
}

impl PlainFileController {
    pub fn new(ctx: ChainContext, backing: Arc<dyn BackingStore>) -> Self {
        Self { ctx, backing }
    }

    fn not_an_archive(&self, name: &EntryName) -> FsError {
        FsError::NoSuchEntry(format!(
            "{} ({} is a plain file)",
            name,
            self.backing.address()
        ))
    }
}

impl Controller for PlainFileController {
    fn mount_point(&self) -> &MountPoint {
        &self.ctx.mount_point
    }

    fn mount(&self, _access: &AccessOptions) -> FsResult<()> {
        self.ctx.status.set(ChainState::Clean);
        Ok(())
    }

    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        if name.is_root() {
            self.backing.stat(access)
        } else {
            Ok(None)
        }
    }

    fn entries(&self, _access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        Ok(Vec::new())
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle> {
        if !name.is_root() {
            return Err(self.not_an_archive(name));
        }
        let data = self.backing.read(access)?;
        Ok(ReadHandle::from_bytes(data, ReadOrigin::Backing).with_stream(self.ctx.streams.open()))
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        if !name.is_root() {
            return Err(FsError::EntryCollision(format!(
                "{} is a plain file, cannot create {}",
                self.backing.address(),
                name
            )));
        }

        let buffer = self.ctx.pool.acquire(0)?;
        let backing = Arc::clone(&self.backing);
        let access = *access;
        let handle = WriteHandle::new(
            name.to_string(),
            buffer,
            Box::new(move |buffer| {
                let sealed = buffer.seal()?;
                backing.write(&sealed, &access)
            }),
        );
        Ok(handle.with_stream(self.ctx.streams.open()))
    }

    fn delete(&self, name: &EntryName, _options: &DeleteOptions) -> FsResult<()> {
        Err(FsError::NotSupported(format!(
            "delete {} inside plain file {}",
            name,
            self.backing.address()
        )))
    }

    fn is_touched(&self) -> bool {
        false
    }

    fn prepare_sync(&self, _options: &SyncOptions) -> FsResult<Option<SyncSnapshot>> {
        Ok(None)
    }

    fn commit_backing(&self, _snapshot: &SyncSnapshot, _options: &SyncOptions) -> FsResult<()> {
        Ok(())
    }

    fn complete_sync(&self, _snapshot: SyncSnapshot) -> FsResult<()> {
        Ok(())
    }

    fn abort_sync(&self, _snapshot: SyncSnapshot) {}

    fn unmount(&self) -> usize {
        self.ctx.status.set(ChainState::Unmounted);
        0
    }
}
