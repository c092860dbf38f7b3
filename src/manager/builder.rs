/*!
 * File System Manager Builder
 * Builder pattern for FsManager construction
 */

use super::factory::ChainFactory;
use super::manager::FsManager;
use crate::address::{ArchiveDetector, Scheme};
use crate::archive::{ArchiveDriver, DriverRegistry, KeyManager};
use crate::core::config::KernelConfig;
use crate::core::errors::FsResult;
use crate::pool::IoBufferPool;
use crate::storage::HostStorage;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Builder for FsManager
pub struct FsManagerBuilder {
    config: KernelConfig,
    storages: Vec<(String, Arc<dyn HostStorage>)>,
    drivers: Vec<(String, Arc<dyn ArchiveDriver>)>,
    keys: Option<Arc<dyn KeyManager>>,
    detector: ArchiveDetector,
}

impl FsManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
            storages: Vec::new(),
            drivers: Vec::new(),
            keys: None,
            detector: ArchiveDetector::standard(),
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve root mount points of `scheme` from `storage`
    pub fn with_storage(mut self, scheme: &str, storage: impl HostStorage + 'static) -> Self {
        self.storages.push((scheme.to_string(), Arc::new(storage)));
        self
    }

    /// Add or replace the archive driver for `scheme`
    pub fn with_driver(mut self, scheme: &str, driver: impl ArchiveDriver + 'static) -> Self {
        self.drivers.push((scheme.to_string(), Arc::new(driver)));
        self
    }

    /// Key manager handed to drivers of encrypted archives
    pub fn with_key_manager(mut self, keys: Arc<dyn KeyManager>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_detector(mut self, detector: ArchiveDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Build the FsManager
    ///
    /// Fails when a registered scheme name is invalid.
    pub fn build(self) -> FsResult<FsManager> {
        let pool = IoBufferPool::new(self.config.pool.clone());
        if self.config.reap_on_start {
            match pool.reap_orphans(self.config.reap_grace) {
                Ok(0) => {}
                Ok(reaped) => info!(reaped, "Removed orphaned pool temp files"),
                Err(e) => warn!(error = %e, "Failed to reap orphaned pool temp files"),
            }
        }

        let storages = DashMap::with_hasher(RandomState::new());
        for (scheme, storage) in self.storages {
            storages.insert(Scheme::new(&scheme)?, storage);
        }

        let drivers = DriverRegistry::standard();
        for (scheme, driver) in self.drivers {
            drivers.register(Scheme::new(&scheme)?, driver);
        }

        info!(
            storages = storages.len(),
            key_manager = self.keys.is_some(),
            "File system manager ready"
        );

        let config = Arc::new(self.config);
        let chains = ChainFactory::new(Arc::clone(&config), pool.clone(), storages, drivers, self.keys);
        Ok(FsManager {
            config,
            pool,
            registry: Arc::clone(&chains.registry),
            chains,
            detector: self.detector,
        })
    }
}

impl Default for FsManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
