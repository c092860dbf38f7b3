/*!
 * Chain State
 * Lifecycle state machine and open-stream tracking shared by a chain's layers
 */

use super::options::LockWait;
use crate::address::MountPoint;
use crate::core::config::KernelConfig;
use crate::core::errors::{FsError, FsResult};
use crate::pool::IoBufferPool;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Lifecycle of one mount point
///
/// `Unmounted -> Mounting -> Clean <-> Dirty -> Syncing -> Clean | Dirty`;
/// a failed mount returns to `Unmounted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Unmounted,
    Mounting,
    Clean,
    Dirty,
    Syncing,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainState::Unmounted => write!(f, "unmounted"),
            ChainState::Mounting => write!(f, "mounting"),
            ChainState::Clean => write!(f, "clean"),
            ChainState::Dirty => write!(f, "dirty"),
            ChainState::Syncing => write!(f, "syncing"),
        }
    }
}

/// Current state plus a condvar for threads waiting for a sync to end
pub struct ChainStatus {
    state: Mutex<ChainState>,
    changed: Condvar,
}

impl ChainStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::Unmounted),
            changed: Condvar::new(),
        }
    }

    #[inline]
    pub fn get(&self) -> ChainState {
        *self.state.lock()
    }

    pub fn set(&self, next: ChainState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "Chain state transition");
            *state = next;
            self.changed.notify_all();
        }
    }

    /// Move from `from` to `to`, returning false when the state was different
    pub fn transition(&self, from: ChainState, to: ChainState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        self.changed.notify_all();
        true
    }

    /// Block until the chain leaves `Syncing`
    ///
    /// Non-blocking callers and expired timeouts get Busy.
    pub fn wait_until_not_syncing(&self, wait: LockWait, mount_point: &MountPoint) -> FsResult<()> {
        let deadline = wait.deadline();
        let mut state = self.state.lock();
        while *state == ChainState::Syncing {
            match wait {
                LockWait::NonBlocking => {
                    return Err(FsError::Busy(format!("{} is syncing", mount_point)));
                }
                LockWait::Blocking { .. } => match deadline {
                    Some(deadline) => {
                        if self.changed.wait_until(&mut state, deadline).timed_out()
                            && *state == ChainState::Syncing
                        {
                            return Err(FsError::Busy(format!(
                                "timed out waiting for sync of {}",
                                mount_point
                            )));
                        }
                    }
                    None => self.changed.wait(&mut state),
                },
            }
        }
        Ok(())
    }
}

impl Default for ChainStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts read and write handles open against one mount point
pub struct StreamTracker {
    open: Mutex<usize>,
    idle: Condvar,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// Register an open stream until the ticket drops
    pub fn open(self: &Arc<Self>) -> StreamTicket {
        *self.open.lock() += 1;
        StreamTicket {
            tracker: Arc::clone(self),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        *self.open.lock()
    }

    /// Wait until no stream is open; false when the deadline passed first
    pub fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut open = self.open.lock();
        while *open > 0 {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut open, deadline).timed_out() {
                        return *open == 0;
                    }
                }
                None => self.idle.wait(&mut open),
            }
        }
        true
    }

    fn close(&self) {
        let mut open = self.open.lock();
        *open = open.saturating_sub(1);
        if *open == 0 {
            self.idle.notify_all();
        }
    }
}

impl Default for StreamTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One open stream; closing is dropping
pub struct StreamTicket {
    tracker: Arc<StreamTracker>,
}

impl Drop for StreamTicket {
    fn drop(&mut self) {
        self.tracker.close();
    }
}

impl fmt::Debug for StreamTicket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StreamTicket").finish()
    }
}

/// Everything the layers of one chain share
#[derive(Clone)]
pub struct ChainContext {
    pub mount_point: MountPoint,
    pub status: Arc<ChainStatus>,
    pub streams: Arc<StreamTracker>,
    pub pool: IoBufferPool,
    pub config: Arc<KernelConfig>,
}

impl ChainContext {
    pub fn new(mount_point: MountPoint, pool: IoBufferPool, config: Arc<KernelConfig>) -> Self {
        Self {
            mount_point,
            status: Arc::new(ChainStatus::new()),
            streams: Arc::new(StreamTracker::new()),
            pool,
            config,
        }
    }
}
