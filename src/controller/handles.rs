/*!
 * Stream Handles
 * Read and write handles returned by controller chains
 */

use super::state::StreamTicket;
use crate::core::errors::{FsError, FsResult};
use crate::core::limits::COPY_CHUNK_SIZE;
use crate::pool::{IoBuffer, SealedBuffer};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use tracing::warn;

/// Where a read handle's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOrigin {
    /// Pending content written in this session
    Pending,
    /// Backing storage or the decoded backing archive
    Backing,
    /// The chain's read cache
    Cache,
}

/// Open read stream on one entry
///
/// Counts as an open stream of its mount point until dropped.
pub struct ReadHandle {
    reader: Box<dyn Read + Send>,
    size: u64,
    origin: ReadOrigin,
    _stream: Option<StreamTicket>,
}

impl ReadHandle {
    pub fn new(reader: Box<dyn Read + Send>, size: u64, origin: ReadOrigin) -> Self {
        Self {
            reader,
            size,
            origin,
            _stream: None,
        }
    }

    pub fn from_bytes(bytes: Bytes, origin: ReadOrigin) -> Self {
        let size = bytes.len() as u64;
        Self::new(Box::new(Cursor::new(bytes)), size, origin)
    }

    pub fn from_sealed(sealed: &SealedBuffer, origin: ReadOrigin) -> FsResult<Self> {
        Ok(Self::new(sealed.reader()?, sealed.len(), origin))
    }

    /// Attach the stream registration of the mount point serving this read
    pub fn with_stream(mut self, ticket: StreamTicket) -> Self {
        self._stream = Some(ticket);
        self
    }

    #[inline]
    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read everything and close the handle
    pub fn read_all(mut self) -> FsResult<Bytes> {
        let mut data = Vec::with_capacity(self.size as usize);
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| FsError::from_io(e, "read entry"))?;
        Ok(Bytes::from(data))
    }
}

impl Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("size", &self.size)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Installs a closed writer's buffer into its destination
pub type CloseAction = Box<dyn FnOnce(IoBuffer) -> FsResult<()> + Send>;

/// Open write stream on one entry
///
/// Content is staged in a pool buffer and reaches the entry on `close`.
/// Dropping an unclosed handle closes it and logs any failure.
pub struct WriteHandle {
    entry: String,
    buffer: Option<IoBuffer>,
    on_close: Option<CloseAction>,
    _stream: Option<StreamTicket>,
}

impl WriteHandle {
    pub fn new(entry: impl Into<String>, buffer: IoBuffer, on_close: CloseAction) -> Self {
        Self {
            entry: entry.into(),
            buffer: Some(buffer),
            on_close: Some(on_close),
            _stream: None,
        }
    }

    pub fn with_stream(mut self, ticket: StreamTicket) -> Self {
        self._stream = Some(ticket);
        self
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Bytes written so far
    pub fn len(&self) -> u64 {
        self.buffer.as_ref().map(IoBuffer::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish writing and make the content visible
    pub fn close(mut self) -> FsResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> FsResult<()> {
        let result = match (self.buffer.take(), self.on_close.take()) {
            (Some(buffer), Some(on_close)) => on_close(buffer),
            _ => Ok(()),
        };
        // Stream stays open until the content is installed
        self._stream = None;
        result
    }
}

impl Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "write handle already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(entry = %self.entry, error = %e, "Failed to commit dropped write handle");
        }
    }
}

impl fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("entry", &self.entry)
            .field("len", &self.len())
            .field("open", &self.buffer.is_some())
            .finish()
    }
}

/// Copy a whole stream in chunks, returning the bytes copied
pub fn copy_stream(reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
    let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&chunk[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}
