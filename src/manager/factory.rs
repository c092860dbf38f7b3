/*!
 * Chain Factory
 * Builds controller chains on demand, ancestors first
 *
 * Nested chains reach their parents through this factory, so a parent
 * chain dropped from the registry is rebuilt on the child's next access.
 */

use super::registry::Registry;
use crate::address::{MountPoint, Scheme};
use crate::archive::{DriverRegistry, KeyManager};
use crate::controller::{
    archive_chain, host_chain, ChainContext, ChainLookup, Controller, ParentBacking, SyncController,
};
use crate::core::config::KernelConfig;
use crate::core::errors::{FsError, FsResult};
use crate::pool::IoBufferPool;
use crate::storage::HostStorage;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub(super) struct ChainFactory {
    this: Weak<ChainFactory>,
    pub(super) config: Arc<KernelConfig>,
    pub(super) pool: IoBufferPool,
    pub(super) registry: Arc<Registry>,
    pub(super) storages: DashMap<Scheme, Arc<dyn HostStorage>, RandomState>,
    pub(super) drivers: DriverRegistry,
    pub(super) keys: Option<Arc<dyn KeyManager>>,
}

impl ChainFactory {
    pub(super) fn new(
        config: Arc<KernelConfig>,
        pool: IoBufferPool,
        storages: DashMap<Scheme, Arc<dyn HostStorage>, RandomState>,
        drivers: DriverRegistry,
        keys: Option<Arc<dyn KeyManager>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            pool,
            registry: Arc::new(Registry::new()),
            storages,
            drivers,
            keys,
        })
    }

    /// Look up or build the chain for `mount_point`, ancestors first
    pub(super) fn resolve(&self, mount_point: &MountPoint) -> FsResult<Arc<SyncController>> {
        if let Some(chain) = self.registry.get(mount_point) {
            return Ok(chain);
        }

        let ctx = ChainContext::new(mount_point.clone(), self.pool.clone(), Arc::clone(&self.config));
        let chain = match mount_point {
            MountPoint::Root { scheme } => {
                let storage = self
                    .storages
                    .get(scheme)
                    .map(|s| Arc::clone(s.value()))
                    .ok_or_else(|| FsError::UnknownScheme(format!("no host storage for {}", scheme)))?;
                host_chain(ctx, storage)
            }
            MountPoint::Composite { scheme, parent } => {
                let driver = self
                    .drivers
                    .get(scheme)
                    .ok_or_else(|| FsError::UnknownScheme(format!("no archive driver for {}", scheme)))?;
                self.resolve(parent.mount_point())?;
                let lookup: Weak<dyn ChainLookup> = self.this.clone();
                let backing = ParentBacking::new(lookup, (**parent).clone());
                archive_chain(ctx, driver, self.keys.clone(), Arc::new(backing))
            }
        };

        debug!(mount_point = %mount_point, "Registered controller chain");
        Ok(self.registry.insert_or_get(mount_point.clone(), chain))
    }
}

impl ChainLookup for ChainFactory {
    fn resolve_chain(&self, mount_point: &MountPoint) -> FsResult<Arc<dyn Controller>> {
        if self.registry.get(mount_point).is_none() {
            warn!(mount_point = %mount_point, "Parent chain missing, rebuilding it");
        }
        let chain: Arc<dyn Controller> = self.resolve(mount_point)?;
        Ok(chain)
    }
}
