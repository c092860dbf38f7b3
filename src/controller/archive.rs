/*!
 * Archive Controller
 * Innermost layer of a composite chain: decodes the backing archive into a
 * model, stages mutations, and re-encodes on sync
 */

use super::backing::BackingStore;
use super::handles::{ReadHandle, ReadOrigin, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::state::{ChainContext, ChainState};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{
    ArchiveDriver, ArchiveModel, ArchiveReader, DriverContext, EncodeEntry, EntryInfo, EntryMeta,
    EntrySource, KeyManager, PlannedContent,
};
use crate::core::errors::{FsError, FsResult};
use crate::sync::SyncOptions;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

struct Mounted {
    model: ArchiveModel,
    /// `None` for an archive that did not exist when mounted
    reader: Option<Box<dyn ArchiveReader>>,
}

type SharedState = Arc<RwLock<Option<Mounted>>>;

pub struct ArchiveController {
    ctx: ChainContext,
    driver: Arc<dyn ArchiveDriver>,
    keys: Option<Arc<dyn KeyManager>>,
    backing: Arc<dyn BackingStore>,
    state: SharedState,
    mount_gate: Mutex<()>,
}

impl ArchiveController {
    pub fn new(
        ctx: ChainContext,
        driver: Arc<dyn ArchiveDriver>,
        keys: Option<Arc<dyn KeyManager>>,
        backing: Arc<dyn BackingStore>,
    ) -> Self {
        Self {
            ctx,
            driver,
            keys,
            backing,
            state: Arc::new(RwLock::new(None)),
            mount_gate: Mutex::new(()),
        }
    }

    fn driver_context(&self) -> DriverContext<'_> {
        DriverContext::new(&self.ctx.mount_point).with_keys(self.keys.as_deref())
    }

    fn decode(&self, data: Bytes) -> FsResult<Box<dyn ArchiveReader>> {
        self.driver
            .decode(&self.driver_context(), data)
            .map_err(|e| e.into_fs_error(self.ctx.mount_point.scheme()))
    }

    fn load(&self, access: &AccessOptions) -> FsResult<Mounted> {
        match self.backing.stat(access)? {
            None => {
                info!(
                    mount_point = %self.ctx.mount_point,
                    "Backing entry absent, mounting as new archive"
                );
                Ok(Mounted {
                    model: ArchiveModel::empty(),
                    reader: None,
                })
            }
            Some(meta) if meta.is_dir() => Err(FsError::NotAFile(self.backing.address().to_string())),
            Some(_) => {
                let data = self.backing.read(access)?;
                let size = data.len();
                let reader = self.decode(data)?;
                let model = ArchiveModel::from_entries(reader.entries());
                info!(
                    mount_point = %self.ctx.mount_point,
                    driver = self.driver.name(),
                    size,
                    "Mounted archive"
                );
                Ok(Mounted {
                    model,
                    reader: Some(reader),
                })
            }
        }
    }

    fn with_mounted<R>(&self, access: &AccessOptions, f: impl FnOnce(&Mounted) -> FsResult<R>) -> FsResult<R> {
        self.mount(access)?;
        let guard = self.state.read();
        match guard.as_ref() {
            Some(mounted) => f(mounted),
            None => Err(unmounted(&self.ctx.mount_point)),
        }
    }

    fn with_mounted_mut<R>(
        &self,
        access: &AccessOptions,
        f: impl FnOnce(&mut Mounted) -> FsResult<R>,
    ) -> FsResult<R> {
        self.mount(access)?;
        let mut guard = self.state.write();
        match guard.as_mut() {
            Some(mounted) => f(mounted),
            None => Err(unmounted(&self.ctx.mount_point)),
        }
    }

    fn read_known(&self, mounted: &Mounted, name: &EntryName) -> FsResult<Bytes> {
        match &mounted.reader {
            Some(reader) => reader
                .read(name)
                .map_err(|e| e.into_fs_error(self.ctx.mount_point.scheme())),
            None => Err(FsError::NoSuchEntry(name.to_string())),
        }
    }
}

impl Controller for ArchiveController {
    fn mount_point(&self) -> &MountPoint {
        &self.ctx.mount_point
    }

    fn mount(&self, access: &AccessOptions) -> FsResult<()> {
        if self.state.read().is_some() {
            return Ok(());
        }
        let _gate = self.mount_gate.lock();
        if self.state.read().is_some() {
            return Ok(());
        }

        self.ctx.status.set(ChainState::Mounting);
        match self.load(access) {
            Ok(mounted) => {
                *self.state.write() = Some(mounted);
                self.ctx.status.set(ChainState::Clean);
                Ok(())
            }
            Err(e) => {
                self.ctx.status.set(ChainState::Unmounted);
                Err(e)
            }
        }
    }

    fn stat(&self, name: &EntryName, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        self.with_mounted(access, |mounted| Ok(mounted.model.stat(name)))
    }

    fn entries(&self, access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.with_mounted(access, |mounted| Ok(mounted.model.entries()))
    }

    fn open_read(&self, name: &EntryName, access: &AccessOptions) -> FsResult<ReadHandle> {
        let handle = self.with_mounted(access, |mounted| match mounted.model.source(name)? {
            EntrySource::Pending(content) => ReadHandle::from_sealed(&content, ReadOrigin::Pending),
            EntrySource::Known(_) => Ok(ReadHandle::from_bytes(
                self.read_known(mounted, name)?,
                ReadOrigin::Backing,
            )),
        })?;
        Ok(handle.with_stream(self.ctx.streams.open()))
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        let buffer = self.ctx.pool.acquire(0)?;
        let ticket =
            self.with_mounted_mut(access, |mounted| mounted.model.register_write(name, SystemTime::now()))?;
        debug!(mount_point = %self.ctx.mount_point, entry = %name, ticket, "Registered pending write");

        let state = Arc::clone(&self.state);
        let entry = name.clone();
        let handle = WriteHandle::new(
            name.to_string(),
            buffer,
            Box::new(move |buffer| {
                let sealed = buffer.seal()?;
                if let Some(mounted) = state.write().as_mut() {
                    mounted.model.install(&entry, ticket, sealed, SystemTime::now());
                }
                Ok(())
            }),
        );
        Ok(handle.with_stream(self.ctx.streams.open()))
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        self.with_mounted_mut(&options.access, |mounted| {
            mounted.model.delete(name, options.recursive)
        })
    }

    fn is_touched(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .map(|mounted| mounted.model.is_touched())
            .unwrap_or(false)
    }

    fn prepare_sync(&self, _options: &SyncOptions) -> FsResult<Option<SyncSnapshot>> {
        let guard = self.state.read();
        let mounted = match guard.as_ref() {
            Some(mounted) if mounted.model.is_touched() => mounted,
            _ => return Ok(None),
        };

        let snapshot = mounted.model.snapshot()?;
        let mut entries = Vec::with_capacity(snapshot.entries.len());
        let mut estimate = 0usize;
        for planned in &snapshot.entries {
            let content = match &planned.content {
                PlannedContent::Directory => None,
                PlannedContent::Pending(sealed) => Some(sealed.to_bytes()?),
                PlannedContent::Known => Some(self.read_known(mounted, &planned.name)?),
            };
            estimate += content.as_ref().map(Bytes::len).unwrap_or(0);
            entries.push(EncodeEntry {
                name: planned.name.clone(),
                meta: planned.meta,
                content,
            });
        }

        let mut buffer = self.ctx.pool.acquire(estimate)?;
        self.driver
            .encode(&self.driver_context(), entries, &mut buffer)
            .map_err(|e| e.into_fs_error(self.ctx.mount_point.scheme()))?;
        let encoded = buffer.seal()?;
        debug!(
            mount_point = %self.ctx.mount_point,
            entries = snapshot.entries.len(),
            bytes = encoded.len(),
            "Serialized archive"
        );
        Ok(Some(SyncSnapshot::new(snapshot, encoded)))
    }

    fn commit_backing(&self, snapshot: &SyncSnapshot, options: &SyncOptions) -> FsResult<()> {
        self.backing
            .write(&snapshot.encoded, &AccessOptions { wait: options.wait })
    }

    fn complete_sync(&self, snapshot: SyncSnapshot) -> FsResult<()> {
        let data = snapshot.encoded.to_bytes()?;
        let reader = self.decode(data)?;
        let mut guard = self.state.write();
        if let Some(mounted) = guard.as_mut() {
            mounted.model.commit(&snapshot.model);
            mounted.reader = Some(reader);
        }
        Ok(())
    }

    fn abort_sync(&self, snapshot: SyncSnapshot) {
        debug!(
            mount_point = %self.ctx.mount_point,
            touched = snapshot.touched_count(),
            "Sync aborted, pending state kept"
        );
    }

    fn unmount(&self) -> usize {
        let discarded = self
            .state
            .write()
            .take()
            .map(|mut mounted| mounted.model.discard_pending())
            .unwrap_or(0);
        self.ctx.status.set(ChainState::Unmounted);
        discarded
    }
}

fn unmounted(mount_point: &MountPoint) -> FsError {
    FsError::Busy(format!("{} was unmounted", mount_point))
}
