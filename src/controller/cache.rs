/*!
 * Cache Layer
 * Keeps recently read backing content in pool buffers, bounded per mount point
 */

use super::handles::{copy_stream, ReadHandle, ReadOrigin, WriteHandle};
use super::options::{AccessOptions, DeleteOptions};
use super::state::ChainContext;
use super::traits::{Controller, SyncSnapshot};
use crate::address::{EntryName, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use crate::core::limits::CACHE_POOL_SHARE_PERCENT;
use crate::pool::{IoBuffer, SealedBuffer};
use crate::sync::SyncOptions;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub struct CacheController {
    ctx: ChainContext,
    inner: Box<dyn Controller>,
    cache: DashMap<EntryName, SealedBuffer, RandomState>,
    cached_bytes: AtomicUsize,
}

impl CacheController {
    pub fn new(ctx: ChainContext, inner: Box<dyn Controller>) -> Self {
        Self {
            ctx,
            inner,
            cache: DashMap::with_hasher(RandomState::new()),
            cached_bytes: AtomicUsize::new(0),
        }
    }

    /// Bytes currently held by the cache
    pub fn cached_bytes(&self) -> usize {
        self.cached_bytes.load(Ordering::Acquire)
    }

    /// Whether one more entry may take a pool buffer
    ///
    /// Bounded by the per-mount-point entry cap and by the share of the
    /// pool that read caches may occupy federation-wide.
    fn admits(&self) -> bool {
        self.cache.len() < self.ctx.config.cache_max_entries
            && self.ctx.pool.has_headroom(CACHE_POOL_SHARE_PERCENT)
    }

    /// Reserve room for `size` bytes within the configured budget
    fn reserve(&self, size: usize) -> bool {
        let max = self.ctx.config.cache_max_bytes;
        self.cached_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(size).filter(|total| *total <= max)
            })
            .is_ok()
    }

    fn evict(&self, name: &EntryName) {
        if let Some((_, sealed)) = self.cache.remove(name) {
            self.cached_bytes
                .fetch_sub(sealed.len() as usize, Ordering::AcqRel);
        }
    }

    fn evict_under(&self, dir: &EntryName) {
        let doomed: Vec<EntryName> = self
            .cache
            .iter()
            .filter(|entry| entry.key() == dir || dir.is_ancestor_of(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for name in doomed {
            self.evict(&name);
        }
    }

    fn clear(&self) -> usize {
        let dropped = self.cache.len();
        self.cache.clear();
        self.cached_bytes.store(0, Ordering::Release);
        dropped
    }

    /// Copy a backing read into a sealed pool buffer
    fn fill(&self, handle: &mut ReadHandle, mut buffer: IoBuffer) -> FsResult<SealedBuffer> {
        copy_stream(handle, &mut buffer).map_err(|e| FsError::from_io(e, "fill read cache"))?;
        buffer.seal()
    }
}

impl Controller for CacheController {
    fn mount_point(&self) -> &MountPoint {
        self.inner.mount_point()
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
        let hit = self.cache.get(name).map(|entry| entry.value().clone());
        if let Some(sealed) = hit {
            debug!(mount_point = %self.ctx.mount_point, entry = %name, "Cache hit");
            return Ok(ReadHandle::from_sealed(&sealed, ReadOrigin::Cache)?
                .with_stream(self.ctx.streams.open()));
        }

        let mut handle = self.inner.open_read(name, access)?;
        if handle.origin() != ReadOrigin::Backing || !self.admits() {
            return Ok(handle);
        }
        let reserved = handle.size() as usize;
        if !self.reserve(reserved) {
            return Ok(handle);
        }

        let buffer = match self.ctx.pool.acquire(reserved) {
            Ok(buffer) => buffer,
            Err(FsError::ResourceExhausted(reason)) => {
                // Serve uncached and hand our own buffers back
                self.cached_bytes.fetch_sub(reserved, Ordering::AcqRel);
                let shed = self.clear();
                debug!(
                    mount_point = %self.ctx.mount_point,
                    shed,
                    reason = %reason,
                    "Pool exhausted, read served uncached"
                );
                return Ok(handle);
            }
            Err(e) => {
                self.cached_bytes.fetch_sub(reserved, Ordering::AcqRel);
                return Err(e);
            }
        };

        match self.fill(&mut handle, buffer) {
            Ok(sealed) => {
                // Exact size replaces the reservation
                self.cached_bytes.fetch_sub(reserved, Ordering::AcqRel);
                self.cached_bytes
                    .fetch_add(sealed.len() as usize, Ordering::AcqRel);
                if let Some(previous) = self.cache.insert(name.clone(), sealed.clone()) {
                    self.cached_bytes
                        .fetch_sub(previous.len() as usize, Ordering::AcqRel);
                }
                Ok(ReadHandle::from_sealed(&sealed, ReadOrigin::Backing)?
                    .with_stream(self.ctx.streams.open()))
            }
            Err(e) => {
                self.cached_bytes.fetch_sub(reserved, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn begin_write(&self, name: &EntryName, access: &AccessOptions) -> FsResult<WriteHandle> {
        self.evict(name);
        self.inner.begin_write(name, access)
    }

    fn delete(&self, name: &EntryName, options: &DeleteOptions) -> FsResult<()> {
        self.inner.delete(name, options)?;
        self.evict_under(name);
        Ok(())
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
        let result = self.inner.complete_sync(snapshot);
        self.clear();
        result
    }

    fn abort_sync(&self, snapshot: SyncSnapshot) {
        self.inner.abort_sync(snapshot)
    }

    fn unmount(&self) -> usize {
        self.clear();
        self.inner.unmount()
    }

    fn shed_cache(&self) -> usize {
        let shed = self.clear();
        if shed > 0 {
            debug!(mount_point = %self.ctx.mount_point, shed, "Shed cached entries");
        }
        shed
    }
}
