/*!
 * Chain Assembly
 * Composes controller layers for root and composite mount points
 */

use super::archive::ArchiveController;
use super::backing::BackingStore;
use super::cache::CacheController;
use super::false_positive::FalsePositiveController;
use super::host::HostController;
use super::lock::LockController;
use super::plain::PlainFileController;
use super::state::ChainContext;
use super::sync::SyncController;
use crate::archive::{ArchiveDriver, KeyManager};
use crate::storage::HostStorage;
use std::sync::Arc;

/// `sync -> lock -> host`
pub fn host_chain(ctx: ChainContext, storage: Arc<dyn HostStorage>) -> SyncController {
    let host = HostController::new(ctx.clone(), storage);
    let lock = LockController::new(ctx.clone(), Box::new(host));
    SyncController::new(ctx, Box::new(lock))
}

/// `sync -> lock -> cache -> false positive -> archive | plain file`
pub fn archive_chain(
    ctx: ChainContext,
    driver: Arc<dyn ArchiveDriver>,
    keys: Option<Arc<dyn KeyManager>>,
    backing: Arc<dyn BackingStore>,
) -> SyncController {
    let archive = ArchiveController::new(ctx.clone(), driver, keys, Arc::clone(&backing));
    let plain = PlainFileController::new(ctx.clone(), backing);
    let detect = FalsePositiveController::new(Box::new(archive), Box::new(plain));
    let cache = CacheController::new(ctx.clone(), Box::new(detect));
    let lock = LockController::new(ctx.clone(), Box::new(cache));
    SyncController::new(ctx, Box::new(lock))
}
