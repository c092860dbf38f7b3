/*!
 * Kernel Limits and Constants
 *
 * Centralized location for the federation's thresholds and magic numbers.
 * Organized by subsystem so defaults are discoverable from one place.
 *
 * - Performance-sensitive constants are marked with [PERF]
 * - Values that bound resource usage are marked with [RESOURCE]
 */

use std::time::Duration;

// =============================================================================
// I/O BUFFER POOL
// =============================================================================

/// Size above which a pooled buffer is backed by a temp file (4MB)
/// Smaller buffers stay in memory
/// [PERF] Keeps typical archive entries off the disk
pub const DEFAULT_MEMORY_THRESHOLD: usize = 4 * 1024 * 1024;

/// Maximum buffers outstanding at once before acquire fails (4096)
/// [RESOURCE] Bounds pending writes plus cached reads across all mount points
pub const DEFAULT_MAX_BUFFERS: usize = 4096;

/// Maximum bytes held in memory-backed buffers (256MB)
/// New content past this budget spills to temp files instead of failing
/// [RESOURCE]
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 256 * 1024 * 1024;

/// Number of released allocations kept for reuse (64)
/// [PERF] Avoids re-allocating for bursts of small writes
pub const RECYCLE_QUEUE_CAPACITY: usize = 64;

/// Largest allocation worth recycling (1MB)
/// Bigger vectors are dropped to give memory back
pub const RECYCLE_MAX_CAPACITY: usize = 1024 * 1024;

/// Prefix of every temp file the pool creates
/// The orphan reaper only touches files carrying this prefix
pub const TEMP_FILE_PREFIX: &str = "fedfs-pool-";

/// Minimum age before an orphaned temp file is reaped (10 minutes)
/// Protects files of other live processes sharing the temp directory
pub const DEFAULT_REAP_GRACE: Duration = Duration::from_secs(10 * 60);

// =============================================================================
// CONTROLLER CHAIN
// =============================================================================

/// Default bounded wait for a mount point lock (30s)
/// Expiry raises the retryable Busy condition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-mount-point budget for cached entry reads (64MB)
/// [RESOURCE] Reads past the budget are served without caching
pub const DEFAULT_CACHE_MAX_BYTES: usize = 64 * 1024 * 1024;

/// Per-mount-point cap on cached entries (256)
/// [RESOURCE] Each cached entry holds one pool buffer
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;

/// Share of `max_buffers` read caches may occupy across the federation (50%)
/// [RESOURCE] The rest stays available for pending writes and sync encoding
pub const CACHE_POOL_SHARE_PERCENT: usize = 50;

/// Copy chunk for moving entry content between streams (64KB)
/// [PERF]
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// ARCHIVE DRIVERS
// =============================================================================

/// Largest ZIP end-of-central-directory comment we scan past (65535 + 22)
pub const ZIP_EOCD_SEARCH_WINDOW: usize = 65_535 + 22;

/// TAR block size
pub const TAR_BLOCK_SIZE: usize = 512;

/// AES-256 key length in bytes
pub const ARCHIVE_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes
pub const ARCHIVE_NONCE_LEN: usize = 12;
