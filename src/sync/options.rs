/*!
 * Sync Options
 */

use crate::controller::LockWait;
use crate::core::config::KernelConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller sets to stop a sync before its commit
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CancelToken").field(&self.is_cancelled()).finish()
    }
}

/// How a sync waits and what it does on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SyncOptions {
    /// Lock wait policy for the exclusive steps
    pub wait: LockWait,
    /// Wait for open streams to close instead of failing Busy
    pub wait_for_streams: bool,
    /// Stop a multi mount point sync at the first failure
    pub abort_on_error: bool,
    /// Unmount clean chains nobody is using once they are synced
    pub evict_idle: bool,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            wait: LockWait::default(),
            wait_for_streams: false,
            abort_on_error: false,
            evict_idle: true,
            cancel: None,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &KernelConfig) -> Self {
        Self {
            wait: LockWait::from_config(config),
            abort_on_error: config.abort_sync_on_error,
            ..Self::default()
        }
    }

    pub fn wait_for_streams(mut self) -> Self {
        self.wait_for_streams = true;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn keep_idle(mut self) -> Self {
        self.evict_idle = false;
        self
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}

/// Result of syncing one mount point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    /// Nothing was pending
    Clean,
    /// Pending mutations of `entries` entries reached the backing store
    Committed { entries: usize },
}

impl SyncOutcome {
    pub fn committed(&self) -> usize {
        match self {
            SyncOutcome::Clean => 0,
            SyncOutcome::Committed { entries } => *entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let options = SyncOptions::default().with_cancel(token.clone());
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
    }

    #[test]
    fn test_from_config() {
        let options = SyncOptions::from_config(&KernelConfig::non_blocking());
        assert_eq!(options.wait, LockWait::NonBlocking);
        assert!(options.evict_idle);

        let json = serde_json::to_string(&SyncOutcome::Committed { entries: 2 }).unwrap();
        assert_eq!(json, r#"{"outcome":"committed","entries":2}"#);
    }
}
