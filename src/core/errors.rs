/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Federation operation result
///
/// # Must Use
/// File system operations can fail and must be handled to prevent data loss
#[must_use = "file system operations can fail and must be handled"]
pub type FsResult<T> = Result<T, FsError>;

/// Errors raised by the federation kernel
///
/// `FalsePositive` is an internal signal: the false-positive layer of a
/// controller chain consumes it and never lets it reach a caller.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum FsError {
    #[error("Invalid address: {0}")]
    #[diagnostic(
        code(address::invalid),
        help("Composite addresses look like `zip:file:/dir/a.zip!/entry`.")
    )]
    InvalidAddress(String),

    #[error("No such entry: {0}")]
    #[diagnostic(code(entry::not_found))]
    NoSuchEntry(String),

    #[error("Entry collision: {0}")]
    #[diagnostic(
        code(entry::collision),
        help("A file cannot be written where a directory exists, or below a file.")
    )]
    EntryCollision(String),

    #[error("Directory not empty: {0}")]
    #[diagnostic(code(entry::not_empty), help("Pass the recursive flag to delete descendants."))]
    DirectoryNotEmpty(String),

    #[error("Is a directory: {0}")]
    #[diagnostic(code(entry::is_directory))]
    IsDirectory(String),

    #[error("Not a file: {0}")]
    #[diagnostic(
        code(mount::not_a_file),
        help("A nested mount point must be backed by a file entry of its parent.")
    )]
    NotAFile(String),

    #[error("Not a valid {scheme} archive: {reason}")]
    #[diagnostic(code(mount::false_positive))]
    FalsePositive { scheme: String, reason: String },

    #[error("Resource exhausted: {0}")]
    #[diagnostic(
        code(pool::exhausted),
        help("Release outstanding buffers or sync dirty mount points, then retry.")
    )]
    ResourceExhausted(String),

    #[error("Busy: {0}")]
    #[diagnostic(code(mount::busy), help("The mount point is held by another operation; retry later."))]
    Busy(String),

    #[error("Key error: {0}")]
    #[diagnostic(code(driver::key))]
    Key(String),

    #[error("Archive driver error: {0}")]
    #[diagnostic(code(driver::failed))]
    Driver(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(io::failed))]
    Io(String),

    #[error("Buffer already released: {0}")]
    #[diagnostic(code(pool::released))]
    Released(String),

    #[error("Unknown scheme: {0}")]
    #[diagnostic(
        code(address::unknown_scheme),
        help("Register a host storage or archive driver for this scheme.")
    )]
    UnknownScheme(String),

    #[error("Not supported: {0}")]
    #[diagnostic(code(fs::not_supported))]
    NotSupported(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(config::invalid))]
    Config(String),

    #[error("Mount point has unsynced changes: {0}")]
    #[diagnostic(code(mount::dirty), help("Sync first, or unmount with force."))]
    Dirty(String),
}

impl FsError {
    /// Whether retrying the same operation later may succeed
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, FsError::Busy(_) | FsError::ResourceExhausted(_))
    }

    #[inline]
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, FsError::Busy(_))
    }

    /// Map a host I/O error, keeping the context of what was attempted
    pub fn from_io(e: std::io::Error, context: impl Into<String>) -> Self {
        use std::io::ErrorKind;
        let context = context.into();
        match e.kind() {
            ErrorKind::NotFound => FsError::NoSuchEntry(context),
            ErrorKind::AlreadyExists => FsError::EntryCollision(context),
            ErrorKind::OutOfMemory => FsError::ResourceExhausted(context),
            _ => FsError::Io(format!("{}: {}", context, e)),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e.to_string())
    }
}

/// Phase of the sync protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    /// Acquiring the exclusive lock or waiting for open streams
    Quiesce,
    /// Serializing the merged view through the archive driver
    Serialize,
    /// Handing the new bytes to the parent mount point or host storage
    Commit,
    /// Replacing the known entry set after a successful commit
    Finalize,
    /// Caller cancelled before the commit became durable
    Cancelled,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncStep::Quiesce => write!(f, "quiesce"),
            SyncStep::Serialize => write!(f, "serialize"),
            SyncStep::Commit => write!(f, "commit"),
            SyncStep::Finalize => write!(f, "finalize"),
            SyncStep::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure to sync one mount point
///
/// Pending mutations are left untouched, so the same sync can be retried.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("sync of {mount_point} failed during {step}: {source}")]
pub struct SyncError {
    pub mount_point: String,
    pub step: SyncStep,
    /// Entries implicated in the failure, empty when it is not entry-specific
    #[serde(skip_serializing_if = "crate::core::serde::is_empty_vec", default)]
    pub entries: Vec<String>,
    #[source]
    pub source: FsError,
}

impl SyncError {
    pub fn new(mount_point: impl fmt::Display, step: SyncStep, source: FsError) -> Self {
        Self {
            mount_point: mount_point.to_string(),
            step,
            entries: Vec::new(),
            source,
        }
    }

    pub fn with_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries = entries.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.source.is_busy()
    }
}

/// Failures collected by a federation-wide sync
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{} mount point(s) failed to sync", errors.len())]
pub struct AggregateSyncError {
    pub errors: Vec<SyncError>,
}

impl AggregateSyncError {
    /// The error recorded for a mount point, if it failed
    pub fn for_mount_point(&self, mount_point: &str) -> Option<&SyncError> {
        self.errors.iter().find(|e| e.mount_point == mount_point)
    }
}
