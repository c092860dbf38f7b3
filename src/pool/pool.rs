/*!
 * I/O Buffer Pool
 * Hands out scratch buffers backed by memory or temp files
 */

use super::buffer::{IoBuffer, Reservation, SealedBuffer};
use super::reaper;
use crate::core::config::PoolConfig;
use crate::core::errors::{FsError, FsResult};
use crate::core::limits::{RECYCLE_MAX_CAPACITY, RECYCLE_QUEUE_CAPACITY};
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub(super) struct PoolInner {
    pub(super) config: PoolConfig,
    pub(super) outstanding: AtomicUsize,
    pub(super) memory_bytes: AtomicUsize,
    pub(super) file_backed: AtomicUsize,
    next_id: AtomicU64,
    recycled: ArrayQueue<Vec<u8>>,
}

impl PoolInner {
    /// Temp file named `{prefix}{pid}-XXXX` in the configured directory
    pub(super) fn create_temp_file(&self) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(&reaper::process_prefix(&self.config.file_prefix))
            .tempfile_in(&self.config.temp_dir)
    }

    /// Reserve memory budget with a CAS loop so concurrent writers never overshoot
    pub(super) fn reserve_memory(&self, additional: usize) -> bool {
        let mut current = self.memory_bytes.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(additional) {
                Some(next) if next <= self.config.max_memory_bytes => next,
                _ => return false,
            };
            match self.memory_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(super) fn release_memory(&self, bytes: usize) {
        if bytes > 0 {
            self.memory_bytes.fetch_sub(bytes, Ordering::SeqCst);
        }
    }

    pub(super) fn take_recycled(&self, capacity: usize) -> Vec<u8> {
        let capacity = capacity.min(self.config.memory_threshold);
        match self.recycled.pop() {
            Some(mut vec) => {
                vec.clear();
                vec.reserve(capacity);
                vec
            }
            None => Vec::with_capacity(capacity),
        }
    }

    pub(super) fn recycle(&self, vec: Vec<u8>) {
        if vec.capacity() > 0 && vec.capacity() <= RECYCLE_MAX_CAPACITY {
            // Queue full: let it drop
            let _ = self.recycled.push(vec);
        }
    }
}

/// Shared pool of I/O buffers
///
/// # Performance
///
/// - Buffers up to the memory threshold stay in memory, larger ones go to
///   a temp file from the start
/// - Memory buffers spill to a temp file once they outgrow the threshold
///   or the pool-wide memory budget
/// - Released allocations are recycled through a lock-free queue
///
/// Clones share the same pool.
#[derive(Clone)]
pub struct IoBufferPool {
    inner: Arc<PoolInner>,
}

impl IoBufferPool {
    pub fn new(config: PoolConfig) -> Self {
        info!(
            memory_threshold = config.memory_threshold,
            max_buffers = config.max_buffers,
            temp_dir = %config.temp_dir.display(),
            "I/O buffer pool initialized"
        );
        Self {
            inner: Arc::new(PoolInner {
                config,
                outstanding: AtomicUsize::new(0),
                memory_bytes: AtomicUsize::new(0),
                file_backed: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                recycled: ArrayQueue::new(RECYCLE_QUEUE_CAPACITY),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a buffer expected to hold about `size_hint` bytes
    ///
    /// Fails with `ResourceExhausted` when `max_buffers` buffers are
    /// outstanding, or when a temp file cannot be created.
    pub fn acquire(&self, size_hint: usize) -> FsResult<IoBuffer> {
        self.reserve_slot()?;
        let reservation = Reservation::new(Arc::clone(&self.inner));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let file = if size_hint > self.inner.config.memory_threshold {
            // Reservation drop gives the slot back on failure
            let file = self.inner.create_temp_file().map_err(|e| {
                FsError::ResourceExhausted(format!("cannot create pool temp file: {}", e))
            })?;
            Some(file)
        } else {
            None
        };

        debug!(
            buffer = id,
            size_hint,
            file_backed = file.is_some(),
            "Acquired pool buffer"
        );
        Ok(IoBuffer::new(id, reservation, file, size_hint))
    }

    /// Copy `data` into a new sealed buffer
    pub fn seal_bytes(&self, data: &[u8]) -> FsResult<SealedBuffer> {
        let mut buffer = self.acquire(data.len())?;
        buffer
            .write_all(data)
            .map_err(|e| FsError::from_io(e, "fill pool buffer"))?;
        buffer.seal()
    }

    fn reserve_slot(&self) -> FsResult<()> {
        let max = self.inner.config.max_buffers;
        let mut current = self.inner.outstanding.load(Ordering::Acquire);
        loop {
            if current >= max {
                return Err(FsError::ResourceExhausted(format!(
                    "{} pool buffers outstanding (max {})",
                    current, max
                )));
            }
            match self.inner.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether outstanding buffers are below `percent` of `max_buffers`
    pub fn has_headroom(&self, percent: usize) -> bool {
        let limit = self.inner.config.max_buffers.saturating_mul(percent) / 100;
        self.inner.outstanding.load(Ordering::Acquire) < limit
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding: self.inner.outstanding.load(Ordering::SeqCst),
            memory_bytes: self.inner.memory_bytes.load(Ordering::SeqCst),
            file_backed: self.inner.file_backed.load(Ordering::SeqCst),
            recycled: self.inner.recycled.len(),
        }
    }

    /// Delete temp files left behind by dead processes
    pub fn reap_orphans(&self, grace: Duration) -> FsResult<usize> {
        reaper::reap_orphans(
            &self.inner.config.temp_dir,
            &self.inner.config.file_prefix,
            grace,
        )
    }
}

impl std::fmt::Debug for IoBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("IoBufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Buffer pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Buffers acquired and not yet released, sealed ones included
    pub outstanding: usize,
    /// Bytes held by memory-backed buffers
    pub memory_bytes: usize,
    /// Buffers currently backed by a temp file
    pub file_backed: usize,
    /// Allocations waiting for reuse
    pub recycled: usize,
}
