/*!
 * Backing Stores
 * Access to the entry holding an archive's bytes, resolved by mount point key
 */

use super::handles::copy_stream;
use super::options::AccessOptions;
use super::traits::Controller;
use crate::address::{Address, MountPoint};
use crate::archive::EntryMeta;
use crate::core::errors::{FsError, FsResult};
use crate::pool::SealedBuffer;
use bytes::Bytes;
use std::sync::{Arc, Weak};

/// Resolves the chain serving a mount point
///
/// Chains refer to their parents by key through this lookup, never by
/// holding the parent chain itself. A parent missing from the registry is
/// built again rather than reported absent.
pub trait ChainLookup: Send + Sync {
    fn resolve_chain(&self, mount_point: &MountPoint) -> FsResult<Arc<dyn Controller>>;
}

/// The entry an archive mount point is stored in
pub trait BackingStore: Send + Sync {
    fn address(&self) -> &Address;

    fn stat(&self, access: &AccessOptions) -> FsResult<Option<EntryMeta>>;

    fn read(&self, access: &AccessOptions) -> FsResult<Bytes>;

    /// Replace the entry's content
    fn write(&self, content: &SealedBuffer, access: &AccessOptions) -> FsResult<()>;
}

/// Backing entry inside the parent mount point's chain
pub struct ParentBacking {
    lookup: Weak<dyn ChainLookup>,
    address: Address,
}

impl ParentBacking {
    pub fn new(lookup: Weak<dyn ChainLookup>, address: Address) -> Self {
        Self { lookup, address }
    }

    fn parent(&self) -> FsResult<Arc<dyn Controller>> {
        let lookup = self.lookup.upgrade().ok_or_else(|| {
            FsError::NotSupported(format!(
                "file system manager of {} has been dropped",
                self.address
            ))
        })?;
        lookup.resolve_chain(self.address.mount_point())
    }
}

impl BackingStore for ParentBacking {
    fn address(&self) -> &Address {
        &self.address
    }

    fn stat(&self, access: &AccessOptions) -> FsResult<Option<EntryMeta>> {
        self.parent()?.stat(self.address.entry(), access)
    }

    fn read(&self, access: &AccessOptions) -> FsResult<Bytes> {
        self.parent()?.open_read(self.address.entry(), access)?.read_all()
    }

    fn write(&self, content: &SealedBuffer, access: &AccessOptions) -> FsResult<()> {
        let parent = self.parent()?;
        let mut writer = parent.begin_write(self.address.entry(), access)?;
        let mut reader = content.reader()?;
        copy_stream(&mut reader, &mut writer)
            .map_err(|e| FsError::from_io(e, format!("write {}", self.address)))?;
        writer.close()
    }
}
