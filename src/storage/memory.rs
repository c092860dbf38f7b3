/*!
 * In-Memory Storage Backend
 * Volatile host storage for tests and scratch federations
 */

use bytes::Bytes;
use dashmap::DashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::traits::HostStorage;
use crate::address::EntryName;
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};

/// In-memory storage node
#[derive(Debug, Clone)]
enum Node {
    File { data: Bytes, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Node {
    fn meta(&self) -> EntryMeta {
        match self {
            Node::File { data, modified } => EntryMeta::file(data.len() as u64, *modified),
            Node::Directory { modified } => EntryMeta::directory(*modified),
        }
    }
}

/// In-memory storage with access counters
///
/// Clones share the same nodes and counters.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    nodes: Arc<DashMap<EntryName, Node, ahash::RandomState>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file directly, bypassing the write counter
    pub fn insert(&self, name: &EntryName, data: impl Into<Bytes>) -> FsResult<()> {
        self.put(name, data.into())
    }

    pub fn create_dir(&self, name: &EntryName) -> FsResult<()> {
        self.ensure_parents(name)?;
        if let Some(Node::File { .. }) = self.nodes.get(name).map(|n| n.value().clone()) {
            return Err(FsError::EntryCollision(format!("{} is a file", name)));
        }
        self.nodes.insert(
            name.clone(),
            Node::Directory {
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Current content of a file, without counting a read
    pub fn get(&self, name: &EntryName) -> Option<Bytes> {
        match self.nodes.get(name).map(|n| n.value().clone()) {
            Some(Node::File { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// Number of file reads served
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of files replaced
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_parents(&self, name: &EntryName) -> FsResult<()> {
        for ancestor in name.ancestors() {
            let existing = self.nodes.get(&ancestor).map(|n| n.value().clone());
            match existing {
                Some(Node::File { .. }) => {
                    return Err(FsError::EntryCollision(format!("{} lies below file {}", name, ancestor)))
                }
                Some(Node::Directory { .. }) => {}
                None => {
                    self.nodes.insert(
                        ancestor,
                        Node::Directory {
                            modified: SystemTime::now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn put(&self, name: &EntryName, data: Bytes) -> FsResult<()> {
        if name.is_root() {
            return Err(FsError::IsDirectory("storage root".to_string()));
        }
        if let Some(Node::Directory { .. }) = self.nodes.get(name).map(|n| n.value().clone()) {
            return Err(FsError::IsDirectory(name.to_string()));
        }
        self.ensure_parents(name)?;
        self.nodes.insert(
            name.clone(),
            Node::File {
                data,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }
}

impl HostStorage for MemStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn stat(&self, name: &EntryName) -> FsResult<Option<EntryMeta>> {
        if name.is_root() {
            return Ok(Some(EntryMeta::directory(SystemTime::UNIX_EPOCH)));
        }
        Ok(self.nodes.get(name).map(|n| n.value().meta()))
    }

    fn open_read(&self, name: &EntryName) -> FsResult<Box<dyn Read + Send>> {
        let node = self.nodes.get(name).map(|n| n.value().clone());
        match node {
            Some(Node::File { data, .. }) => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Cursor::new(data)))
            }
            Some(Node::Directory { .. }) => Err(FsError::IsDirectory(name.to_string())),
            None if name.is_root() => Err(FsError::IsDirectory(name.to_string())),
            None => Err(FsError::NoSuchEntry(name.to_string())),
        }
    }

    fn write_replace(&self, name: &EntryName, content: &mut dyn Read) -> FsResult<u64> {
        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .map_err(|e| FsError::from_io(e, format!("write {}", name)))?;
        let written = data.len() as u64;
        self.put(name, Bytes::from(data))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    fn delete(&self, name: &EntryName, recursive: bool) -> FsResult<()> {
        if name.is_root() {
            return Err(FsError::NotSupported("cannot delete the storage root".to_string()));
        }
        let node = self
            .nodes
            .get(name)
            .map(|n| n.value().clone())
            .ok_or_else(|| FsError::NoSuchEntry(name.to_string()))?;

        if let Node::Directory { .. } = node {
            let has_children = self.nodes.iter().any(|n| name.is_ancestor_of(n.key()));
            if has_children && !recursive {
                return Err(FsError::DirectoryNotEmpty(name.to_string()));
            }
            self.nodes.retain(|key, _| !name.is_ancestor_of(key));
        }
        self.nodes.remove(name);
        Ok(())
    }

    fn list(&self, dir: &EntryName) -> FsResult<Vec<EntryInfo>> {
        match self.stat(dir)? {
            Some(meta) if meta.is_dir() => {}
            Some(_) => return Err(FsError::NotAFile(format!("{} is not a directory", dir))),
            None => return Err(FsError::NoSuchEntry(dir.to_string())),
        }
        let mut entries: Vec<EntryInfo> = self
            .nodes
            .iter()
            .filter(|n| n.key().parent().as_ref() == Some(dir))
            .map(|n| EntryInfo::new(n.key().clone(), n.value().meta()))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> EntryName {
        EntryName::parse(raw).unwrap()
    }

    #[test]
    fn test_counters() {
        let storage = MemStorage::new();
        storage.insert(&name("a.zip"), &b"bytes"[..]).unwrap();
        assert_eq!(storage.read_count(), 0);

        storage.read(&name("a.zip")).unwrap();
        storage
            .write_replace(&name("b"), &mut Cursor::new(b"b".to_vec()))
            .unwrap();
        assert_eq!(storage.read_count(), 1);
        assert_eq!(storage.write_count(), 1);

        let clone = storage.clone();
        clone.read(&name("b")).unwrap();
        assert_eq!(storage.read_count(), 2);
    }

    #[test]
    fn test_hierarchy() {
        let storage = MemStorage::new();
        storage.insert(&name("d/e/f.txt"), &b"f"[..]).unwrap();
        assert!(storage.stat(&name("d/e")).unwrap().unwrap().is_dir());
        assert!(matches!(storage.insert(&name("d/e/f.txt/g"), &b"g"[..]), Err(FsError::EntryCollision(_))));

        let listed: Vec<_> = storage.list(&EntryName::root()).unwrap().into_iter().map(|e| e.name.to_string()).collect();
        assert_eq!(listed, vec!["d"]);

        assert!(matches!(storage.delete(&name("d"), false), Err(FsError::DirectoryNotEmpty(_))));
        storage.delete(&name("d"), true).unwrap();
        assert!(storage.stat(&name("d/e/f.txt")).unwrap().is_none());
    }
}
