/*!
 * Federated Archive File System Kernel
 * Nested archive mount points behaving as one transactional file system
 */

pub mod address;
pub mod archive;
pub mod controller;
pub mod core;
pub mod manager;
pub mod monitoring;
pub mod pool;
pub mod storage;
pub mod sync;

// Re-exports
pub use address::{Address, ArchiveDetector, EntryName, MountPoint, Scheme};
pub use archive::{
    ArchiveDriver, ArchiveKey, DriverRegistry, EncryptedDriver, EntryInfo, EntryKind, EntryMeta, KeyManager,
    StaticKeyManager, TarDriver, ZipDriver,
};
pub use controller::{AccessOptions, ChainState, DeleteOptions, LockWait, ReadHandle, ReadOrigin, WriteHandle};
pub use crate::core::{AggregateSyncError, FsError, FsResult, KernelConfig, PoolConfig, SyncError, SyncStep};
pub use manager::{FsManager, FsManagerBuilder, MountInfo};
pub use monitoring::init_tracing;
pub use pool::{IoBuffer, IoBufferPool, PoolStats, SealedBuffer};
pub use storage::{HostStorage, LocalStorage, MemStorage};
pub use sync::{CancelToken, SyncOptions, SyncOutcome};
