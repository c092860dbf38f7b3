/*!
 * Host Controller
 * Innermost layer of a root chain, passing operations to host storage
 *
 * Host writes replace the target on close, so a root chain never holds
 * pending state and never needs a sync.
 */

use super::handles::{ReadHandle, ReadOrigin, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::state::{ChainContext, ChainState};
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use crate::storage::HostStorage;
use crate::sync::SyncOptions;
use std::sync::Arc;
use tracing::debug;

pub struct HostController {
    ctx: ChainContext,
    storage: Arc<dyn HostStorage>,
}

impl HostController {
    pub fn new(ctx: ChainContext, storage: Arc<dyn HostStorage>) -> Self {
        Self { ctx, storage }
    }
}

impl Controller for HostController {
    fn mount_point(&self) -> &MountPoint {
        &self.ctx.mount_point
    }

    fn mount(&self, _access: &AccessOptions) -> FsResult<()> {
        self.ctx.status.transition(ChainState::Unmounted, ChainState::Clean);
        Ok(())
    }

    fn stat(&self, name: &EntryName, _access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        self.storage.stat(name)
    }

    fn entries(&self, _access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        let mut all = Vec::new();
        let mut pending = vec![EntryName::root()];
        while let Some(dir) = pending.pop() {
            for info in self.storage.list(&dir)? {
                if info.meta.is_dir() {
                    pending.push(info.name.clone());
                }
                all.push(info);
            }
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn list(&self, dir: &EntryName, _access: &AccessOptions) -> FsResult<Vec<EntryInfo>> {
        self.storage.list(dir)
    }

    fn open_read(&self, name: &EntryName, _access: &AccessOptions) -> FsResult<ReadHandle> {
        let meta = self
            .storage
            .stat(name)?
            .ok_or_else(|| FsError::NoSuchEntry(format!("{}{}", self.ctx.mount_point, name)))?;
        if meta.is_dir() {
            return Err(FsError::IsDirectory(format!("{}{}", self.ctx.mount_point, name)));
        }
        let reader = self.storage.open_read(name)?;
        Ok(ReadHandle::new(reader, meta.size, ReadOrigin::Backing).with_stream(self.ctx.streams.open()))
    }

    fn begin_write(&self, name: &EntryName, _access: &AccessOptions) -> FsResult<WriteHandle> {
        if name.is_root() {
            return Err(FsError::EntryCollision(format!("cannot write {}", self.ctx.mount_point)));
        }
        if let Some(meta) = self.storage.stat(name)? {
            if meta.is_dir() {
                return Err(FsError::EntryCollision(format!("{} is a directory", name)));
            }
        }

        let buffer = self.ctx.pool.acquire(0)?;
        let storage = Arc::clone(&self.storage);
        let entry = name.clone();
        let handle = WriteHandle::new(
            name.to_string(),
            buffer,
            Box::new(move |buffer| {
                let sealed = buffer.seal()?;
                let mut reader = sealed.reader()?;
                let written = storage.write_replace(&entry, &mut reader)?;
                debug!(storage = storage.name(), entry = %entry, written, "Replaced host entry");
                Ok(())
            }),
        );
        Ok(handle.with_stream(self.ctx.streams.open()))
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        if name.is_root() {
            return Err(FsError::NotSupported(format!("delete {}", self.ctx.mount_point)));
        }
        self.storage.delete(name, options.recursive)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::KernelConfig;
    use crate::pool::IoBufferPool;
    use crate::storage::MemStorage;
    use std::io::Write;

    fn host(storage: MemStorage) -> HostController {
        let ctx = ChainContext::new(
            MountPoint::parse("mem:/").unwrap(),
            IoBufferPool::new(Default::default()),
            Arc::new(KernelConfig::default()),
        );
        HostController::new(ctx, Arc::new(storage))
    }

    #[test]
    fn test_write_replaces_on_close() {
        let storage = MemStorage::new();
        let controller = host(storage.clone());
        let access = AccessOptions::default();
        let name = EntryName::parse("dir/a.txt").unwrap();

        let mut handle = controller.begin_write(&name, &access).unwrap();
        handle.write_all(b"host").unwrap();
        assert!(storage.get(&name).is_none());
        handle.close().unwrap();

        assert_eq!(storage.get(&name).unwrap().as_ref(), b"host");
        let all = controller.entries(&access).unwrap();
        let names: Vec<&str> = all.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["dir", "dir/a.txt"]);
        assert!(!controller.is_touched());
    }

    #[test]
    fn test_read_missing_and_directory() {
        let storage = MemStorage::new();
        storage.create_dir(&EntryName::parse("d").unwrap()).unwrap();
        let controller = host(storage);
        let access = AccessOptions::default();

        assert!(matches!(
            controller.open_read(&EntryName::parse("nope").unwrap(), &access),
            Err(FsError::NoSuchEntry(_))
        ));
        assert!(matches!(
            controller.open_read(&EntryName::parse("d").unwrap(), &access),
            Err(FsError::IsDirectory(_))
        ));
    }
}
