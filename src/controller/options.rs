/*!
 * Access Options
 * How an operation waits for a busy mount point
 */

use crate::core::config::KernelConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lock wait policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum LockWait {
    /// Wait for the lock, raising Busy once `timeout` expires
    Blocking {
        #[serde(with = "crate::core::serde::optional_duration_millis", default)]
        timeout: Option<Duration>,
    },
    /// Fail with Busy instead of waiting
    NonBlocking,
}

impl LockWait {
    pub fn from_config(config: &KernelConfig) -> Self {
        if config.non_blocking {
            LockWait::NonBlocking
        } else {
            LockWait::Blocking {
                timeout: config.lock_timeout,
            }
        }
    }

    /// Wait forever
    pub const fn forever() -> Self {
        LockWait::Blocking { timeout: None }
    }

    /// Absolute deadline, `None` when waiting is unbounded or not allowed
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            LockWait::Blocking { timeout: Some(t) } => Some(Instant::now() + *t),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, LockWait::Blocking { .. })
    }
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait::forever()
    }
}

/// Options shared by read and write operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOptions {
    pub wait: LockWait,
}

impl AccessOptions {
    pub fn from_config(config: &KernelConfig) -> Self {
        Self {
            wait: LockWait::from_config(config),
        }
    }

    pub const fn blocking(timeout: Option<Duration>) -> Self {
        Self {
            wait: LockWait::Blocking { timeout },
        }
    }

    pub const fn non_blocking() -> Self {
        Self {
            wait: LockWait::NonBlocking,
        }
    }
}

/// Options for `delete`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub access: AccessOptions,
    /// Delete directories together with their descendants
    pub recursive: bool,
}

impl DeleteOptions {
    pub fn new(access: AccessOptions) -> Self {
        Self {
            access,
            recursive: false,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}
