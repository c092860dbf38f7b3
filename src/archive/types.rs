/*!
 * Archive Entry Types
 * Format-independent entry metadata reported by every driver
 */

use crate::address::EntryName;
use crate::core::serde::{is_zero_u64, system_time_micros};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// Entry metadata
///
/// Timestamps are serialized as microseconds since UNIX epoch, sizes are
/// skipped when zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EntryMeta {
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub size: u64,
    #[serde(with = "system_time_micros")]
    pub modified: SystemTime,
}

impl EntryMeta {
    pub fn file(size: u64, modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            modified,
        }
    }

    pub fn directory(modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            modified,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    #[inline]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }
}

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: EntryName,
    #[serde(flatten)]
    pub meta: EntryMeta,
}

impl EntryInfo {
    pub fn new(name: EntryName, meta: EntryMeta) -> Self {
        Self { name, meta }
    }
}
