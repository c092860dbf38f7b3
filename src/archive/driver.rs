/*!
 * Archive Driver Contract
 * Format-specific decode/encode adapters consumed by the controller chain
 */

use super::keys::KeyManager;
use super::types::{EntryInfo, EntryMeta};
use crate::address::{EntryName, MountPoint, Scheme};
use crate::core::errors::FsError;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

/// Driver failures
///
/// `Format` means the bytes are not an archive of the driver's format at
/// all; the controller chain answers it with plain-file fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("not a recognized archive: {0}")]
    Format(String),

    #[error("corrupt entry {entry}: {reason}")]
    Corrupt { entry: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl DriverError {
    /// Map to a kernel error, attributing it to `scheme`
    pub fn into_fs_error(self, scheme: &Scheme) -> FsError {
        match self {
            DriverError::Format(reason) => FsError::FalsePositive {
                scheme: scheme.to_string(),
                reason,
            },
            DriverError::Corrupt { entry, reason } => {
                FsError::Driver(format!("{} entry {}: {}", scheme, entry, reason))
            }
            DriverError::Unsupported(what) => FsError::NotSupported(format!("{}: {}", scheme, what)),
            DriverError::Key(reason) => FsError::Key(reason),
            DriverError::Io(reason) => FsError::Io(reason),
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

/// What a driver may know about the mount point it serves
pub struct DriverContext<'a> {
    pub mount_point: &'a MountPoint,
    pub keys: Option<&'a dyn KeyManager>,
}

impl<'a> DriverContext<'a> {
    pub fn new(mount_point: &'a MountPoint) -> Self {
        Self {
            mount_point,
            keys: None,
        }
    }

    pub fn with_keys(mut self, keys: Option<&'a dyn KeyManager>) -> Self {
        self.keys = keys;
        self
    }
}

/// One entry handed to `encode`
pub struct EncodeEntry {
    pub name: EntryName,
    pub meta: EntryMeta,
    /// `None` for directories
    pub content: Option<Bytes>,
}

/// Decoded view of a backing archive
pub trait ArchiveReader: Send + Sync {
    /// Every entry stored in the archive
    fn entries(&self) -> Vec<EntryInfo>;

    /// Content of one file entry
    fn read(&self, name: &EntryName) -> Result<Bytes, DriverError>;
}

/// Archive format adapter
///
/// Drivers see whole byte sources and sinks only; locking, caching and
/// sync ordering are the controller chain's business.
pub trait ArchiveDriver: Send + Sync {
    /// Short format name for logs
    fn name(&self) -> &str;

    /// Parse the bytes of a backing file
    fn decode(&self, ctx: &DriverContext<'_>, data: Bytes) -> Result<Box<dyn ArchiveReader>, DriverError>;

    /// Serialize `entries` into `sink`
    fn encode(
        &self,
        ctx: &DriverContext<'_>,
        entries: Vec<EncodeEntry>,
        sink: &mut dyn Write,
    ) -> Result<(), DriverError>;
}

/// Drivers by archive scheme
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Arc<DashMap<Scheme, Arc<dyn ArchiveDriver>, ahash::RandomState>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled zip, tar and encrypted drivers
    pub fn standard() -> Self {
        let registry = Self::new();
        for (scheme, driver) in [
            ("zip", Arc::new(super::zip::ZipDriver::new()) as Arc<dyn ArchiveDriver>),
            ("tar", Arc::new(super::tar::TarDriver::new())),
            ("ezip", Arc::new(super::encrypted::EncryptedDriver::new(super::zip::ZipDriver::new()))),
            ("etar", Arc::new(super::encrypted::EncryptedDriver::new(super::tar::TarDriver::new()))),
        ] {
            if let Ok(scheme) = Scheme::new(scheme) {
                registry.register(scheme, driver);
            }
        }
        registry
    }

    pub fn register(&self, scheme: Scheme, driver: Arc<dyn ArchiveDriver>) {
        self.drivers.insert(scheme, driver);
    }

    pub fn get(&self, scheme: &Scheme) -> Option<Arc<dyn ArchiveDriver>> {
        self.drivers.get(scheme).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, scheme: &Scheme) -> bool {
        self.drivers.contains_key(scheme)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut schemes: Vec<String> = self.drivers.iter().map(|e| e.key().to_string()).collect();
        schemes.sort();
        f.debug_struct("DriverRegistry").field("schemes", &schemes).finish()
    }
}
