/*!
 * Pooled I/O Buffers
 * Exclusive write side, one-way seal, shared read side
 */

use super::pool::PoolInner;
use crate::core::errors::{FsError, FsResult};
use bytes::Bytes;
use std::fmt;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Accounting for one buffer, returned to the pool on drop
pub(super) struct Reservation {
    pool: Arc<PoolInner>,
    memory: usize,
    file_backed: bool,
}

impl Reservation {
    pub(super) fn new(pool: Arc<PoolInner>) -> Self {
        Self {
            pool,
            memory: 0,
            file_backed: false,
        }
    }

    fn grow_memory(&mut self, additional: usize) -> bool {
        if self.pool.reserve_memory(additional) {
            self.memory += additional;
            true
        } else {
            false
        }
    }

    fn move_to_file(&mut self) {
        self.pool.release_memory(self.memory);
        self.memory = 0;
        if !self.file_backed {
            self.file_backed = true;
            self.pool.file_backed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.release_memory(self.memory);
        if self.file_backed {
            self.pool.file_backed.fetch_sub(1, Ordering::SeqCst);
        }
        self.pool.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Backing {
    Memory(Vec<u8>),
    File(BufWriter<NamedTempFile>),
}

/// Scratch storage being filled by exactly one writer
///
/// Dropping an unsealed buffer releases it. `release` may be called any
/// number of times; writes after release fail.
pub struct IoBuffer {
    id: u64,
    len: u64,
    backing: Option<Backing>,
    reservation: Option<Reservation>,
}

impl IoBuffer {
    pub(super) fn new(id: u64, reservation: Reservation, backing_file: Option<NamedTempFile>, capacity: usize) -> Self {
        let backing = match backing_file {
            Some(file) => Backing::File(BufWriter::new(file)),
            None => Backing::Memory(reservation.pool.take_recycled(capacity)),
        };
        let mut reservation = reservation;
        if matches!(backing, Backing::File(_)) {
            reservation.move_to_file();
        }
        Self {
            id,
            len: 0,
            backing: Some(backing),
            reservation: Some(reservation),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bytes written so far
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing, Some(Backing::File(_)))
    }

    pub fn is_released(&self) -> bool {
        self.backing.is_none()
    }

    /// Move memory content into a temp file once it outgrows its budget
    fn spill(&mut self) -> io::Result<()> {
        let reservation = match self.reservation.as_mut() {
            Some(r) => r,
            None => return Err(released_io(self.id)),
        };
        let mut file = BufWriter::new(reservation.pool.create_temp_file()?);
        if let Some(Backing::Memory(vec)) = self.backing.take() {
            file.write_all(&vec)?;
            reservation.pool.recycle(vec);
        }
        reservation.move_to_file();
        debug!(buffer = self.id, len = self.len, "Spilled pool buffer to temp file");
        self.backing = Some(Backing::File(file));
        Ok(())
    }

    /// Seal the buffer, flushing it to its backing medium
    ///
    /// Sealing is one-way: the returned handle is read-only and may be
    /// cloned for concurrent readers.
    pub fn seal(mut self) -> FsResult<SealedBuffer> {
        let reservation = self.reservation.take().ok_or_else(|| released(self.id))?;
        let content = match self.backing.take() {
            Some(Backing::Memory(vec)) => SealedContent::Memory(Bytes::from(vec)),
            Some(Backing::File(writer)) => {
                let file = writer
                    .into_inner()
                    .map_err(|e| FsError::from_io(e.into_error(), "flush pool buffer"))?;
                SealedContent::File(file)
            }
            None => return Err(released(self.id)),
        };

        Ok(SealedBuffer {
            inner: Some(Arc::new(SealedInner {
                id: self.id,
                len: self.len,
                content,
                _reservation: reservation,
            })),
        })
    }

    /// Give the buffer back to the pool; idempotent
    pub fn release(&mut self) {
        if let Some(backing) = self.backing.take() {
            match backing {
                Backing::Memory(vec) => {
                    if let Some(reservation) = self.reservation.as_ref() {
                        reservation.pool.recycle(vec);
                    }
                }
                Backing::File(writer) => match writer.into_inner() {
                    Ok(file) => {
                        if let Err(e) = file.close() {
                            warn!(buffer = self.id, error = %e, "Failed to delete pool temp file");
                        }
                    }
                    Err(e) => {
                        warn!(buffer = self.id, error = %e.error(), "Failed to flush discarded pool buffer");
                    }
                },
            }
        }
        self.reservation = None;
    }
}

impl Write for IoBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let needs_spill = match (&self.backing, self.reservation.as_mut()) {
            (Some(Backing::Memory(vec)), Some(reservation)) => {
                vec.len() + buf.len() > reservation.pool.config.memory_threshold
                    || !reservation.grow_memory(buf.len())
            }
            (Some(Backing::File(_)), Some(_)) => false,
            _ => return Err(released_io(self.id)),
        };
        if needs_spill {
            self.spill()?;
        }

        match self.backing.as_mut() {
            Some(Backing::Memory(vec)) => vec.extend_from_slice(buf),
            Some(Backing::File(file)) => file.write_all(buf)?,
            None => return Err(released_io(self.id)),
        }
        self.len += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.backing.as_mut() {
            Some(Backing::File(file)) => file.flush(),
            Some(Backing::Memory(_)) => Ok(()),
            None => Err(released_io(self.id)),
        }
    }
}

impl Drop for IoBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IoBuffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("file_backed", &self.is_file_backed())
            .field("released", &self.is_released())
            .finish()
    }
}

enum SealedContent {
    Memory(Bytes),
    File(NamedTempFile),
}

struct SealedInner {
    id: u64,
    len: u64,
    content: SealedContent,
    _reservation: Reservation,
}

impl Drop for SealedInner {
    fn drop(&mut self) {
        if let SealedContent::File(file) = std::mem::replace(&mut self.content, SealedContent::Memory(Bytes::new())) {
            if let Err(e) = file.close() {
                warn!(buffer = self.id, error = %e, "Failed to delete pool temp file");
            }
        }
    }
}

/// Immutable buffer content, shareable between concurrent readers
///
/// Clones share the same backing storage, which is freed when the last
/// clone is released or dropped.
#[derive(Clone)]
pub struct SealedBuffer {
    inner: Option<Arc<SealedInner>>,
}

impl SealedBuffer {
    fn inner(&self) -> FsResult<&Arc<SealedInner>> {
        self.inner
            .as_ref()
            .ok_or_else(|| FsError::Released("sealed buffer".to_string()))
    }

    /// Buffer id, `None` once released
    pub fn id(&self) -> Option<u64> {
        self.inner.as_ref().map(|i| i.id)
    }

    pub fn len(&self) -> u64 {
        self.inner.as_ref().map(|i| i.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(
            self.inner.as_deref(),
            Some(SealedInner {
                content: SealedContent::File(_),
                ..
            })
        )
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Independent reader positioned at the start of the content
    pub fn reader(&self) -> FsResult<Box<dyn Read + Send>> {
        let inner = self.inner()?;
        match &inner.content {
            SealedContent::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            SealedContent::File(file) => {
                let reopened = file
                    .reopen()
                    .map_err(|e| FsError::from_io(e, format!("reopen pool buffer {}", inner.id)))?;
                Ok(Box::new(reopened.take(inner.len)))
            }
        }
    }

    /// Whole content in memory
    pub fn to_bytes(&self) -> FsResult<Bytes> {
        let inner = self.inner()?;
        match &inner.content {
            SealedContent::Memory(bytes) => Ok(bytes.clone()),
            SealedContent::File(_) => {
                let mut data = Vec::with_capacity(inner.len as usize);
                self.reader()?
                    .read_to_end(&mut data)
                    .map_err(|e| FsError::from_io(e, format!("read pool buffer {}", inner.id)))?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Drop this handle's share of the content; idempotent
    pub fn release(&mut self) {
        self.inner = None;
    }
}

impl fmt::Debug for SealedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SealedBuffer")
            .field("id", &self.id())
            .field("len", &self.len())
            .field("file_backed", &self.is_file_backed())
            .finish()
    }
}

fn released(id: u64) -> FsError {
    FsError::Released(format!("pool buffer {}", id))
}

fn released_io(id: u64) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("pool buffer {} already released", id))
}
