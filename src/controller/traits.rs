/*!
 * Controller Traits
 * The operation set every layer of a controller chain implements
 */

use super::handles::{ReadHandle, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta, ModelSnapshot};
use crate::core::errors::FsResult;
use crate::pool::SealedBuffer;
use crate::sync::SyncOptions;

/// Serialized state of a mount point between prepare and completion of a sync
#[derive(Debug)]
pub struct SyncSnapshot {
    pub(crate) model: ModelSnapshot,
    /// New content of the backing entry
    pub encoded: SealedBuffer,
}

impl SyncSnapshot {
    pub fn new(model: ModelSnapshot, encoded: SealedBuffer) -> Self {
        Self { model, encoded }
    }

    /// Entries whose pending mutations this sync commits
    pub fn touched(&self) -> Vec<String> {
        self.model.touched().map(ToString::to_string).collect()
    }

    pub fn touched_count(&self) -> usize {
        self.model.touched_count()
    }
}

/// One layer of a controller chain
///
/// Every layer implements the same operations and delegates to the next;
/// layers are composed innermost first when a chain is built.
pub trait Controller: Send + Sync {
    fn mount_point(&self) -> &MountPoint;

    /// Make sure the backing resource has been read
    fn mount(&self, access: &AccessOptions) -> FsResult<()>;

    /// Metadata of an entry, `None` when it does not exist
    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>>;

    /// Every entry of the mount point, recomputed on each call
    fn entries(&self, access: &AccessOptions) -> FsResult<Vec<EntryInfo>>;

    /// Direct children of a directory
    fn list(&self, dir: &EntryName, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        Ok(self
            .entries(access)?
            .into_iter()
            .filter(|info| info.name.parent().as_ref() == Some(dir))
            .collect())
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle>;

    /// Register a pending creation or replacement and return its writer
    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle>;

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()>;

    /// Whether there are pending mutations to sync
    fn is_touched(&self) -> bool;

    /// Freeze and serialize pending state; `None` when there is nothing to commit
    fn prepare_sync(&self, options: &SyncOptions) -> FsResult<Option<SyncSnapshot>>;

    /// Hand the serialized bytes to the parent mount point or host storage
    fn commit_backing(&self, snapshot: &SyncSnapshot, options: &SyncOptions) -> FsResult<()>;

    /// Adopt a committed snapshot as the new known state
    fn complete_sync(&self, snapshot: SyncSnapshot) -> FsResult<()>;

    /// Abandon a prepared sync, leaving pending state untouched
    fn abort_sync(&self, snapshot: SyncSnapshot);

    /// Drop pending mutations and decoded state, as for a forced unmount
    fn unmount(&self) -> usize;

    /// Give cached pool buffers back; returns how many entries were dropped
    fn shed_cache(&self) -> usize {
        0
    }
}
