/*!
 * Archive Module
 * Per-mount-point archive model and the bundled format drivers
 */

pub mod driver;
pub mod encrypted;
pub mod keys;
pub mod model;
pub mod tar;
pub mod types;
pub mod zip;

// Re-export for convenience
pub use driver::{ArchiveDriver, ArchiveReader, DriverContext, DriverError, DriverRegistry, EncodeEntry};
pub use encrypted::EncryptedDriver;
pub use keys::{ArchiveKey, KeyManager, KeyPurpose, StaticKeyManager};
pub use model::{ArchiveModel, EntrySource, ModelSnapshot, PlannedContent, PlannedEntry, WriteTicket};
pub use tar::TarDriver;
pub use types::{EntryInfo, EntryKind, EntryMeta};
pub use zip::ZipDriver;
