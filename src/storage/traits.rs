/*!
 * Host Storage Traits
 * Byte-stream providers behind root mount points
 */

use crate::address::EntryName;
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use bytes::Bytes;
use std::io::Read;

/// Host storage provider
///
/// Serves one root mount point scheme. Names are already normalized and
/// cannot escape the provider's root. Writes replace whole files and must
/// never leave a partially written file visible.
pub trait HostStorage: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Metadata, `None` when nothing exists at `name`
    fn stat(&self, name: &EntryName) -> FsResult<Option<EntryMeta>>;

    /// Stream the content of a file
    fn open_read(&self, name: &EntryName) -> FsResult<Box<dyn Read + Send>>;

    /// Read a whole file
    fn read(&self, name: &EntryName) -> FsResult<Bytes> {
        let mut data = Vec::new();
        self.open_read(name)?
            .read_to_end(&mut data)
            .map_err(|e| FsError::from_io(e, format!("read {}", name)))?;
        Ok(Bytes::from(data))
    }

    /// Replace the file at `name` with everything read from `content`,
    /// creating parent directories; returns the bytes written
    fn write_replace(&self, name: &EntryName, content: &mut dyn Read) -> FsResult<u64>;

    /// Remove a file, or a directory (with its contents when `recursive`)
    fn delete(&self, name: &EntryName, recursive: bool) -> FsResult<()>;

    /// Direct children of a directory
    fn list(&self, dir: &EntryName) -> FsResult<Vec<EntryInfo>>;
}
