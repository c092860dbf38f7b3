/*!
 * File System Manager
 * Registry of controller chains and the federation-wide operations on it
 *
 * Chains are created lazily on first resolution, outermost ancestor first,
 * and refer to their parents by mount point key through the registry.
 * Syncs run deepest first and hold one mount point's lock at a time.
 */

use super::builder::FsManagerBuilder;
use super::factory::ChainFactory;
use super::info::MountInfo;
use super::registry::Registry;
use crate::address::{Address, ArchiveDetector, MountPoint};
use crate::archive::{EntryInfo, EntryMeta};
use crate::controller::{
    copy_stream, AccessOptions, ChainState, Controller, DeleteOptions, ReadHandle, SyncController,
    WriteHandle,
};
use crate::core::config::KernelConfig;
use crate::core::errors::{AggregateSyncError, FsError, FsResult, SyncError};
use crate::pool::{IoBufferPool, PoolStats};
use crate::sync::{SyncOptions, SyncOutcome};
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point to a federation of mount points
///
/// Scoped to one instance: independent managers share nothing.
pub struct FsManager {
    pub(super) config: Arc<KernelConfig>,
    pub(super) pool: IoBufferPool,
    pub(super) registry: Arc<Registry>,
    pub(super) chains: Arc<ChainFactory>,
    pub(super) detector: ArchiveDetector,
}

impl FsManager {
    pub fn builder() -> FsManagerBuilder {
        FsManagerBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Access options derived from the configured lock policy
    pub fn access(&self) -> AccessOptions {
        AccessOptions::from_config(&self.config)
    }

    /// Sync options derived from the configured lock policy
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::from_config(&self.config)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Composite address for a plain path, by archive file-name suffix
    pub fn detect(&self, raw: &str) -> FsResult<Address> {
        self.detector.detect(raw)
    }

    /// Look up or build the chain for `mount_point`, ancestors first
    pub fn resolve(&self, mount_point: &MountPoint) -> FsResult<Arc<SyncController>> {
        self.chains.resolve(mount_point)
    }

    pub fn stat(&self, address: &Address) -> FsResult<Option<EntryMeta>> {
        self.resolve(address.mount_point())?
            .stat(address.entry(), &self.access())
    }

    pub fn exists(&self, address: &Address) -> FsResult<bool> {
        Ok(self.stat(address)?.is_some())
    }

    /// Every entry of a mount point
    pub fn entries(&self, mount_point: &MountPoint) -> FsResult<Vec<EntryInfo>> {
        self.resolve(mount_point)?.entries(&self.access())
    }

    /// Direct children of the directory at `address`
    pub fn list(&self, address: &Address) -> FsResult<Vec<EntryInfo>> {
        self.resolve(address.mount_point())?
            .list(address.entry(), &self.access())
    }

    pub fn open_read(&self, address: &Address) -> FsResult<ReadHandle> {
        self.resolve(address.mount_point())?
            .open_read(address.entry(), &self.access())
    }

    pub fn read(&self, address: &Address) -> FsResult<Bytes> {
        self.open_read(address)?.read_all()
    }

    /// Start replacing the entry at `address`
    ///
    /// A clean nested mount point backed by this entry is unmounted first;
    /// a dirty one makes the write fail Busy.
    pub fn begin_write(&self, address: &Address) -> FsResult<WriteHandle> {
        let chain = self.resolve(address.mount_point())?;
        self.evict_backed_by(address, false)?;
        let access = self.access();
        match chain.begin_write(address.entry(), &access) {
            Err(FsError::ResourceExhausted(_)) if self.shed_caches() > 0 => {
                chain.begin_write(address.entry(), &access)
            }
            other => other,
        }
    }

    /// Write a whole entry and close it
    pub fn write(&self, address: &Address, data: &[u8]) -> FsResult<()> {
        let mut handle = self.begin_write(address)?;
        copy_stream(&mut Cursor::new(data), &mut handle)
            .map_err(|e| FsError::from_io(e, format!("write {}", address)))?;
        handle.close()
    }

    pub fn delete(&self, address: &Address, recursive: bool) -> FsResult<()> {
        let chain = self.resolve(address.mount_point())?;
        self.evict_backed_by(address, recursive)?;
        let mut options = DeleteOptions::new(self.access());
        options.recursive = recursive;
        chain.delete(address.entry(), &options)
    }

    fn evict_backed_by(&self, address: &Address, nested: bool) -> FsResult<()> {
        let children = self.registry.backed_by(address, nested);
        if children.is_empty() {
            return Ok(());
        }
        if let Some((mp, _)) = children
            .iter()
            .find(|(_, chain)| chain.is_touched() || chain.open_streams() > 0)
        {
            return Err(FsError::Busy(format!(
                "nested mount point {} is in use or has unsynced changes",
                mp
            )));
        }
        for (mp, chain) in children {
            self.registry.remove(&mp);
            chain.unmount();
            debug!(mount_point = %mp, "Evicted nested mount point before replacing its backing entry");
        }
        Ok(())
    }

    /// Sync one mount point and its registered descendants, deepest first
    pub fn sync(
        &self,
        mount_point: &MountPoint,
        options: &SyncOptions,
    ) -> Result<Vec<(MountPoint, SyncOutcome)>, AggregateSyncError> {
        self.sync_chains(self.registry.subtree(mount_point), options)
    }

    /// Sync every registered mount point, deepest first
    ///
    /// A failing mount point does not stop its siblings unless
    /// `abort_on_error` is set.
    pub fn sync_all(&self, options: &SyncOptions) -> Result<(), AggregateSyncError> {
        let result = self.sync_chains(self.registry.deepest_first(), options);
        if options.evict_idle {
            self.evict_idle();
        }
        result.map(|_| ())
    }

    fn sync_chains(
        &self,
        chains: Vec<(MountPoint, Arc<SyncController>)>,
        options: &SyncOptions,
    ) -> Result<Vec<(MountPoint, SyncOutcome)>, AggregateSyncError> {
        let mut outcomes = Vec::with_capacity(chains.len());
        let mut errors: Vec<SyncError> = Vec::new();

        for (mp, chain) in chains {
            let result = match chain.sync(options) {
                Err(e)
                    if matches!(e.source, FsError::ResourceExhausted(_))
                        && self.shed_caches() > 0 =>
                {
                    debug!(mount_point = %mp, "Retrying sync after shedding read caches");
                    chain.sync(options)
                }
                other => other,
            };
            match result {
                Ok(outcome) => outcomes.push((mp, outcome)),
                Err(e) => {
                    warn!(mount_point = %mp, step = %e.step, error = %e.source, "Sync failed");
                    errors.push(e);
                    if options.abort_on_error {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(outcomes)
        } else {
            Err(AggregateSyncError { errors })
        }
    }

    /// Give every chain's cached reads back to the pool
    ///
    /// Returns how many cached entries were dropped.
    pub fn shed_caches(&self) -> usize {
        self.registry
            .deepest_first()
            .iter()
            .map(|(_, chain)| chain.shed_cache())
            .sum()
    }

    /// Drop clean chains nobody uses, deepest first; returns how many
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        for (mp, chain) in self.registry.deepest_first() {
            let idle = chain.state() != ChainState::Syncing
                && !chain.is_touched()
                && chain.open_streams() == 0
                && !self.registry.has_children(&mp);
            drop(chain);
            if !idle {
                continue;
            }
            if let Some(chain) = self.registry.remove_if_unreferenced(&mp) {
                chain.unmount();
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, remaining = self.registry.len(), "Evicted idle mount points");
        }
        evicted
    }

    /// Remove a mount point and its descendants from the registry
    ///
    /// Without `force`, fails Dirty when any of them has pending changes and
    /// Busy when any has open streams. Returns the pending mutations discarded.
    pub fn unmount(&self, mount_point: &MountPoint, force: bool) -> FsResult<usize> {
        let chains = self.registry.subtree(mount_point);
        if !force {
            if let Some((mp, _)) = chains.iter().find(|(_, chain)| chain.is_touched()) {
                return Err(FsError::Dirty(mp.to_string()));
            }
            if let Some((mp, _)) = chains.iter().find(|(_, chain)| chain.open_streams() > 0) {
                return Err(FsError::Busy(format!("{} has open streams", mp)));
            }
        }

        let mut discarded = 0;
        for (mp, chain) in chains {
            self.registry.remove(&mp);
            discarded += chain.unmount();
        }
        if discarded > 0 {
            warn!(mount_point = %mount_point, discarded, "Unmount discarded pending changes");
        }
        Ok(discarded)
    }

    /// Sync everything, then unmount every chain left clean
    ///
    /// Dirty chains stay registered together with their ancestors so a
    /// later sync can still commit them.
    pub fn shutdown(&self, options: &SyncOptions) -> Result<(), AggregateSyncError> {
        let options = SyncOptions {
            evict_idle: false,
            ..options.clone()
        };
        let result = self.sync_all(&options);

        for (mp, chain) in self.registry.deepest_first() {
            if chain.is_touched() {
                warn!(mount_point = %mp, "Left dirty mount point registered at shutdown");
                continue;
            }
            if self.registry.has_children(&mp) {
                debug!(mount_point = %mp, "Kept mount point backing a registered descendant");
                continue;
            }
            self.registry.remove(&mp);
            chain.unmount();
        }
        info!(remaining = self.registry.len(), "File system manager shut down");
        result
    }

    /// Registered mount points, outermost first
    pub fn mounts(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<MountInfo> = self
            .registry
            .deepest_first()
            .into_iter()
            .map(|(mount_point, chain)| MountInfo {
                depth: mount_point.depth(),
                state: chain.state(),
                touched: chain.is_touched(),
                open_streams: chain.open_streams(),
                mount_point,
            })
            .collect();
        mounts.reverse();
        mounts
    }
}

impl std::fmt::Debug for FsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FsManager")
            .field("mounts", &self.registry.len())
            .field("drivers", &self.chains.drivers)
            .field("pool", &self.pool)
            .finish()
    }
}
