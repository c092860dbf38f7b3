/*!
 * Kernel Configuration
 *
 * Runtime configuration for the buffer pool, lock waits and caching
 */

use super::errors::{FsError, FsResult};
use super::limits::*;
use super::serde::{duration_millis, optional_duration_millis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// I/O buffer pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PoolConfig {
    /// Buffers larger than this are backed by a temp file
    pub memory_threshold: usize,
    /// Outstanding buffers allowed before `acquire` fails
    pub max_buffers: usize,
    /// Memory budget across all memory-backed buffers
    pub max_memory_bytes: usize,
    /// Directory for temp-file backing
    pub temp_dir: PathBuf,
    /// Name prefix of temp files, also the reaper's match pattern
    pub file_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_buffers: DEFAULT_MAX_BUFFERS,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            temp_dir: std::env::temp_dir(),
            file_prefix: TEMP_FILE_PREFIX.to_string(),
        }
    }
}

/// Federation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KernelConfig {
    pub pool: PoolConfig,
    /// Bounded wait for a mount point lock, `None` waits forever
    #[serde(with = "optional_duration_millis")]
    pub lock_timeout: Option<Duration>,
    /// Fail with Busy instead of waiting for mount point locks
    pub non_blocking: bool,
    /// Cached-read budget per mount point
    pub cache_max_bytes: usize,
    /// Cached-entry cap per mount point
    pub cache_max_entries: usize,
    /// Delete orphaned pool temp files when the manager starts
    pub reap_on_start: bool,
    #[serde(with = "duration_millis")]
    pub reap_grace: Duration,
    /// Stop `sync_all` at the first failing mount point
    pub abort_sync_on_error: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
            non_blocking: false,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            reap_on_start: true,
            reap_grace: DEFAULT_REAP_GRACE,
            abort_sync_on_error: false,
        }
    }
}

impl KernelConfig {
    /// Configuration for constrained hosts: small in-memory buffers, no read cache
    pub fn low_memory() -> Self {
        Self {
            pool: PoolConfig {
                memory_threshold: 64 * 1024,
                max_memory_bytes: 16 * 1024 * 1024,
                ..PoolConfig::default()
            },
            cache_max_bytes: 0,
            cache_max_entries: 0,
            ..Self::default()
        }
    }

    /// Configuration where lock contention fails fast with Busy
    pub fn non_blocking() -> Self {
        Self {
            non_blocking: true,
            lock_timeout: None,
            ..Self::default()
        }
    }

    /// Default configuration overridden by environment variables
    ///
    /// - FEDFS_CONFIG: JSON file read first, see `from_json_file`
    /// - FEDFS_TEMP_DIR: temp directory for file-backed buffers
    /// - FEDFS_POOL_THRESHOLD: memory threshold in bytes
    /// - FEDFS_LOCK_TIMEOUT_MS: lock timeout in milliseconds, 0 for non-blocking
    pub fn from_env() -> Self {
        let mut config = match std::env::var("FEDFS_CONFIG") {
            Ok(path) => Self::from_json_file(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Falling back to default configuration");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Ok(dir) = std::env::var("FEDFS_TEMP_DIR") {
            config.pool.temp_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = env_parse::<usize>("FEDFS_POOL_THRESHOLD") {
            config.pool.memory_threshold = threshold;
        }
        if let Some(millis) = env_parse::<u64>("FEDFS_LOCK_TIMEOUT_MS") {
            if millis == 0 {
                config.non_blocking = true;
                config.lock_timeout = None;
            } else {
                config.lock_timeout = Some(Duration::from_millis(millis));
            }
        }

        config
    }
}

impl KernelConfig {
    /// Load a configuration file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> FsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FsError::from_io(e, format!("read config {}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| FsError::Config(format!("{}: {}", path.display(), e)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(key, value = %value, "Ignoring unparsable configuration value");
                None
            }
        },
        Err(_) => None,
    }
}
