/*!
 * False Positive Layer
 * Falls back to plain-file access when a backing entry fails to decode
 */

use super::handles::{ReadHandle, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use crate::sync::SyncOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Routes to the archive controller until its mount reports a false
/// positive, then to the plain-file controller for the rest of the
/// chain's life
pub struct FalsePositiveController {
    archive: Box<dyn Controller>,
    plain: Box<dyn Controller>,
    plain_mode: AtomicBool,
}

impl FalsePositiveController {
    pub fn new(archive: Box<dyn Controller>, plain: Box<dyn Controller>) -> Self {
        Self {
            archive,
            plain,
            plain_mode: AtomicBool::new(false),
        }
    }

    /// Whether the backing entry was found not to be an archive
    #[inline]
    pub fn is_plain(&self) -> bool {
        self.plain_mode.load(Ordering::Acquire)
    }

    fn active(&self) -> &dyn Controller {
        if self.is_plain() {
            self.plain.as_ref()
        } else {
            self.archive.as_ref()
        }
    }

    fn route(&self, access: &AccessOptions) -> FsResult<&dyn Controller> {
        if self.is_plain() {
            return Ok(self.plain.as_ref());
        }
        match self.archive.mount(access) {
            Ok(()) => Ok(self.archive.as_ref()),
            Err(FsError::FalsePositive { scheme, reason }) => {
                warn!(
                    mount_point = %self.archive.mount_point(),
                    %scheme,
                    %reason,
                    "Backing entry is not an archive, serving it as a plain file"
                );
                self.plain_mode.store(true, Ordering::Release);
                self.plain.mount(access)?;
                Ok(self.plain.as_ref())
            }
            Err(e) => Err(e),
        }
    }
}

impl Controller for FalsePositiveController {
    fn mount_point(&self) -> &MountPoint {
        self.archive.mount_point()
    }

    fn mount(&self, access: &AccessOptions) -> FsResult<()> {
        self.route(access).map(|_| ())
    }

    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        self.route(access)?.stat(name, access)
    }

    fn entries(&self, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.route(access)?.entries(access)
    }

    fn list(&self, dir: &EntryName, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.route(access)?.list(dir, access)
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle> {
        self.route(access)?.open_read(name, access)
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        self.route(access)?.begin_write(name, access)
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        self.route(&options.access)?.delete(name, options)
    }

    fn is_touched(&self) -> bool {
        self.active().is_touched()
    }

    fn prepare_sync(&self, options: &SyncOptions) -> FsResult<Option<SyncSnapshot>> {
        self.active().prepare_sync(options)
    }

    fn commit_backing(&self, snapshot: &SyncSnapshot, options: &SyncOptions) -> FsResult<()> {
        self.active().commit_backing(snapshot, options)
    }

    fn complete_sync(&self, snapshot: SyncSnapshot) -> FsResult<()> {
        self.active().complete_sync(snapshot)
    }

    fn abort_sync(&self, snapshot: SyncSnapshot) {
        self.active().abort_sync(snapshot)
    }

    fn unmount(&self) -> usize {
        self.active().unmount()
    }
}
