/*!
 * Archive File System Model
 * Known entry snapshot plus the pending mutation log of one mount point
 */

use super::types::{EntryInfo, EntryKind, EntryMeta};
use crate::address::EntryName;
use crate::core::errors::{FsError, FsResult};
use crate::pool::SealedBuffer;
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::debug;

/// Identifies one registered write so a late `install` cannot clobber a
/// newer write or resurrect a deleted entry
pub type WriteTicket = u64;

#[derive(Debug)]
enum Pending {
    /// Creation or replacement; `content` is `None` while the writer is open
    Write {
        content: Option<SealedBuffer>,
        meta: EntryMeta,
        ticket: WriteTicket,
    },
    Delete,
}

/// Where the bytes of a readable entry come from
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Written in this session, served from the pool
    Pending(SealedBuffer),
    /// Unchanged since the last mount or sync, served by the driver
    Known(EntryMeta),
}

/// Content of one entry in a sync snapshot
#[derive(Debug, Clone)]
pub enum PlannedContent {
    Directory,
    Pending(SealedBuffer),
    Known,
}

#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub name: EntryName,
    pub meta: EntryMeta,
    pub content: PlannedContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Write(WriteTicket),
    Delete,
}

/// Frozen merged view of a model, consumed by one sync
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub entries: Vec<PlannedEntry>,
    markers: Vec<(EntryName, Marker)>,
}

impl ModelSnapshot {
    /// Names with pending mutations captured by this snapshot
    pub fn touched(&self) -> impl Iterator<Item = &EntryName> {
        self.markers.iter().map(|(name, _)| name)
    }

    pub fn touched_count(&self) -> usize {
        self.markers.len()
    }
}

/// In-memory model of one archive
///
/// The pending log is the only mutable state between syncs; `commit`
/// replaces the known set wholesale.
#[derive(Debug, Default)]
pub struct ArchiveModel {
    known: BTreeMap<EntryName, EntryMeta>,
    pending: BTreeMap<EntryName, Pending>,
    next_ticket: WriteTicket,
}

impl ArchiveModel {
    /// Model of a new, empty archive
    pub fn empty() -> Self {
        Self::default()
    }

    /// Model over the entries decoded from a backing archive
    pub fn from_entries(entries: impl IntoIterator<Item = EntryInfo>) -> Self {
        let known = entries
            .into_iter()
            .filter(|info| !info.name.is_root())
            .map(|info| (info.name, info.meta))
            .collect();
        Self {
            known,
            ..Self::default()
        }
    }

    /// Whether any creation or deletion is pending
    #[inline]
    pub fn is_touched(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Known entries merged with pending writes, minus pending deletions,
    /// plus implied parent directories; sorted by name
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.merged()
            .into_iter()
            .map(|(name, meta)| EntryInfo::new(name, meta))
            .collect()
    }

    fn merged(&self) -> BTreeMap<EntryName, EntryMeta> {
        let mut merged: BTreeMap<EntryName, EntryMeta> = self
            .known
            .iter()
            .filter(|(name, _)| !self.pending.contains_key(*name))
            .map(|(name, meta)| (name.clone(), *meta))
            .collect();

        for (name, pending) in &self.pending {
            if let Pending::Write { meta, .. } = pending {
                merged.insert(name.clone(), *meta);
            }
        }

        let implied: Vec<(EntryName, EntryMeta)> = merged
            .iter()
            .flat_map(|(name, meta)| {
                name.ancestors()
                    .map(move |dir| (dir, EntryMeta::directory(meta.modified)))
            })
            .collect();
        for (dir, meta) in implied {
            merged.entry(dir).or_insert(meta);
        }

        merged
    }

    /// Metadata of one entry in the merged view
    pub fn stat(&self, name: &EntryName) -> Option<EntryMeta> {
        if name.is_root() {
            return Some(EntryMeta::directory(self.root_modified()));
        }
        match self.pending.get(name) {
            Some(Pending::Write { meta, .. }) => return Some(*meta),
            Some(Pending::Delete) => {}
            None => {
                if let Some(meta) = self.known.get(name) {
                    return Some(*meta);
                }
            }
        }
        // Implied directory
        self.merged_descendant(name)
            .map(|meta| EntryMeta::directory(meta.modified))
    }

    fn root_modified(&self) -> SystemTime {
        self.merged()
            .values()
            .map(|meta| meta.modified)
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn merged_descendant(&self, dir: &EntryName) -> Option<EntryMeta> {
        let written = self.pending.iter().find_map(|(name, pending)| match pending {
            Pending::Write { meta, .. } if dir.is_ancestor_of(name) => Some(*meta),
            _ => None,
        });
        written.or_else(|| {
            self.known
                .iter()
                .find(|(name, _)| dir.is_ancestor_of(name) && !self.pending.contains_key(*name))
                .map(|(_, meta)| *meta)
        })
    }

    /// Where to read the bytes of `name` from
    pub fn source(&self, name: &EntryName) -> FsResult<EntrySource> {
        match self.pending.get(name) {
            Some(Pending::Write {
                content: Some(content),
                ..
            }) => return Ok(EntrySource::Pending(content.clone())),
            Some(Pending::Write { content: None, .. }) => {
                return Err(FsError::Busy(format!("{} has an open writer", name)))
            }
            Some(Pending::Delete) => return Err(FsError::NoSuchEntry(name.to_string())),
            None => {}
        }

        match self.known.get(name) {
            Some(meta) if meta.is_file() => Ok(EntrySource::Known(*meta)),
            Some(_) => Err(FsError::IsDirectory(name.to_string())),
            None if name.is_root() || self.merged_descendant(name).is_some() => {
                Err(FsError::IsDirectory(name.to_string()))
            }
            None => Err(FsError::NoSuchEntry(name.to_string())),
        }
    }

    /// Register a pending creation or replacement of `name`
    ///
    /// The entry is visible immediately with size zero; its content arrives
    /// with `install` once the writer closes. An earlier pending write of the
    /// same name is replaced and its buffer released.
    pub fn register_write(&mut self, name: &EntryName, modified: SystemTime) -> FsResult<WriteTicket> {
        if name.is_root() {
            return Err(FsError::EntryCollision("cannot write the archive root".to_string()));
        }
        if let Some(meta) = self.stat(name) {
            if meta.is_dir() {
                return Err(FsError::EntryCollision(format!("{} is a directory", name)));
            }
        }
        for ancestor in name.ancestors() {
            if let Some(meta) = self.stat(&ancestor) {
                if meta.is_file() {
                    return Err(FsError::EntryCollision(format!(
                        "{} lies below file {}",
                        name, ancestor
                    )));
                }
            }
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(
            name.clone(),
            Pending::Write {
                content: None,
                meta: EntryMeta::file(0, modified),
                ticket,
            },
        );
        debug!(entry = %name, ticket, "Registered pending write");
        Ok(ticket)
    }

    /// Attach sealed content to the pending write identified by `ticket`
    ///
    /// Returns false when that write was cancelled or superseded meanwhile;
    /// the content is then dropped.
    pub fn install(&mut self, name: &EntryName, ticket: WriteTicket, content: SealedBuffer, modified: SystemTime) -> bool {
        match self.pending.get_mut(name) {
            Some(Pending::Write {
                content: slot,
                meta,
                ticket: current,
            }) if *current == ticket => {
                meta.size = content.len();
                meta.modified = modified;
                *slot = Some(content);
                true
            }
            _ => {
                debug!(entry = %name, ticket, "Discarding content of superseded write");
                false
            }
        }
    }

    /// Record a pending deletion of `name`
    ///
    /// Cancels a pending write of the same name, releasing its buffer.
    /// Directories with descendants need `recursive`.
    pub fn delete(&mut self, name: &EntryName, recursive: bool) -> FsResult<()> {
        if name.is_root() {
            return Err(FsError::NotSupported("cannot delete the archive root".to_string()));
        }
        let meta = self
            .stat(name)
            .ok_or_else(|| FsError::NoSuchEntry(name.to_string()))?;

        if meta.kind == EntryKind::Directory {
            let descendants: Vec<EntryName> = self
                .merged()
                .into_keys()
                .filter(|candidate| name.is_ancestor_of(candidate))
                .collect();
            if !descendants.is_empty() && !recursive {
                return Err(FsError::DirectoryNotEmpty(name.to_string()));
            }
            for descendant in &descendants {
                self.remove_entry(descendant);
            }
        }
        self.remove_entry(name);
        debug!(entry = %name, recursive, "Registered pending delete");
        Ok(())
    }

    fn remove_entry(&mut self, name: &EntryName) {
        if self.known.contains_key(name) {
            self.pending.insert(name.clone(), Pending::Delete);
        } else {
            // Dropping the cancelled write releases its buffer
            self.pending.remove(name);
        }
    }

    /// Freeze the merged view for serialization
    ///
    /// Fails Busy while any pending write still has an open writer.
    pub fn snapshot(&self) -> FsResult<ModelSnapshot> {
        let open: Vec<&EntryName> = self
            .pending
            .iter()
            .filter(|(_, p)| matches!(p, Pending::Write { content: None, .. }))
            .map(|(name, _)| name)
            .collect();
        if !open.is_empty() {
            return Err(FsError::Busy(format!("{} entries have open writers", open.len())));
        }

        let entries = self
            .merged()
            .into_iter()
            .map(|(name, meta)| {
                let content = match self.pending.get(&name) {
                    Some(Pending::Write {
                        content: Some(content),
                        ..
                    }) => PlannedContent::Pending(content.clone()),
                    _ if meta.is_dir() => PlannedContent::Directory,
                    _ => PlannedContent::Known,
                };
                PlannedEntry { name, meta, content }
            })
            .collect();

        let markers = self
            .pending
            .iter()
            .map(|(name, pending)| {
                let marker = match pending {
                    Pending::Write { ticket, .. } => Marker::Write(*ticket),
                    Pending::Delete => Marker::Delete,
                };
                (name.clone(), marker)
            })
            .collect();

        Ok(ModelSnapshot { entries, markers })
    }

    /// Adopt a committed snapshot as the new known set
    ///
    /// Only the mutations captured by the snapshot leave the pending log;
    /// their buffers are released with them.
    pub fn commit(&mut self, snapshot: &ModelSnapshot) {
        self.known = snapshot
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.meta))
            .collect();

        for (name, marker) in &snapshot.markers {
            let captured = match (self.pending.get(name), marker) {
                (Some(Pending::Write { ticket, .. }), Marker::Write(expected)) => ticket == expected,
                (Some(Pending::Delete), Marker::Delete) => true,
                _ => false,
            };
            if captured {
                self.pending.remove(name);
            }
        }
    }

    /// Drop every pending mutation, releasing their buffers
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}
