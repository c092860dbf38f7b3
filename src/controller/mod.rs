/*!
 * Controller Chains
 * Layered per mount point controllers: sync, lock, cache, false positive,
 * and the archive or host controller at the bottom
 */

mod archive;
mod backing;
mod cache;
mod chain;
mod false_positive;
mod handles;
mod host;
mod lock;
mod options;
mod plain;
mod state;
mod sync;
mod traits;

pub use archive::ArchiveController;
pub use backing::{BackingStore, ChainLookup, ParentBacking};
pub use cache::CacheController;
pub use chain::{archive_chain, host_chain};
pub use false_positive::FalsePositiveController;
pub use handles::{copy_stream, CloseAction, ReadHandle, ReadOrigin, WriteHandle};
pub use host::HostController;
pub use lock::{LockController, MountGuard, MountLock};
pub use options::{AccessOptions, DeleteOptions, LockWait};
pub use plain::PlainFileController;
pub use state::{ChainContext, ChainState, ChainStatus, StreamTicket, StreamTracker};
pub use sync::SyncController;
pub use traits::{Controller, SyncSnapshot};
