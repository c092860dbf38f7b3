/*!
 * Address Model
 * Immutable value types naming resources across nested mount points
 */

mod address;
mod detector;
mod entry_name;
mod mount_point;
mod scheme;

pub use address::Address;
pub use detector::ArchiveDetector;
pub use entry_name::{EntryName, MOUNT_SEPARATOR};
pub use mount_point::MountPoint;
pub use scheme::Scheme;
