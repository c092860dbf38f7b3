/*!
 * Local Storage Backend
 * Wraps std::fs for host file access, replacing files atomically
 */

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::traits::HostStorage;
use crate::address::EntryName;
use crate::archive::{EntryInfo, EntryMeta};
use crate::core::errors::{FsError, FsResult};
use tempfile::NamedTempFile;
use tracing::debug;

/// Host directory served as a root mount point
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create storage rooted at the specified directory
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry names never contain `.`/`..`, so joining segments stays below root
    fn resolve(&self, name: &EntryName) -> PathBuf {
        let mut path = self.root.clone();
        for segment in name.segments() {
            path.push(segment);
        }
        path
    }

    /// Convert std::fs::Metadata to entry metadata
    fn convert_metadata(md: &fs::Metadata) -> EntryMeta {
        let modified = md.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if md.is_dir() {
            EntryMeta::directory(modified)
        } else {
            EntryMeta::file(md.len(), modified)
        }
    }
}

impl HostStorage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn stat(&self, name: &EntryName) -> FsResult<Option<EntryMeta>> {
        match fs::metadata(self.resolve(name)) {
            Ok(md) => Ok(Some(Self::convert_metadata(&md))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsError::from_io(e, format!("stat {}", name))),
        }
    }

    fn open_read(&self, name: &EntryName) -> FsResult<Box<dyn Read + Send>> {
        let path = self.resolve(name);
        if path.is_dir() {
            return Err(FsError::IsDirectory(name.to_string()));
        }
        let file = fs::File::open(&path).map_err(|e| FsError::from_io(e, format!("open {}", name)))?;
        Ok(Box::new(file))
    }

    fn write_replace(&self, name: &EntryName, content: &mut dyn Read) -> FsResult<u64> {
        if name.is_root() {
            return Err(FsError::IsDirectory("storage root".to_string()));
        }
        let path = self.resolve(name);
        if path.is_dir() {
            return Err(FsError::IsDirectory(name.to_string()));
        }
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| FsError::from_io(e, format!("create parent of {}", name)))?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| FsError::from_io(e, format!("create temp file for {}", name)))?;
        let written = io::copy(content, temp.as_file_mut())
            .map_err(|e| FsError::from_io(e, format!("write {}", name)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| FsError::from_io(e, format!("sync {}", name)))?;
        temp.persist(&path)
            .map_err(|e| FsError::from_io(e.error, format!("replace {}", name)))?;

        debug!(path = %path.display(), bytes = written, "Replaced host file");
        Ok(written)
    }

    fn delete(&self, name: &EntryName, recursive: bool) -> FsResult<()> {
        if name.is_root() {
            return Err(FsError::NotSupported("cannot delete the storage root".to_string()));
        }
        let path = self.resolve(name);
        let md = fs::symlink_metadata(&path).map_err(|e| FsError::from_io(e, format!("delete {}", name)))?;
        let result = if md.is_dir() {
            if recursive {
                fs::remove_dir_all(&path)
            } else {
                let empty = fs::read_dir(&path)
                    .map_err(|e| FsError::from_io(e, format!("list {}", name)))?
                    .next()
                    .is_none();
                if !empty {
                    return Err(FsError::DirectoryNotEmpty(name.to_string()));
                }
                fs::remove_dir(&path)
            }
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| FsError::from_io(e, format!("delete {}", name)))
    }

    fn list(&self, dir: &EntryName) -> FsResult<Vec<EntryInfo>> {
        let path = self.resolve(dir);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| FsError::from_io(e, format!("list {}", dir)))? {
            let entry = entry.map_err(|e| FsError::from_io(e, format!("list {}", dir)))?;
            let file_name = entry.file_name();
            let file_name = match file_name.to_str() {
                Some(file_name) => file_name,
                None => continue,
            };
            // Skip host names the address grammar cannot express
            let name = match dir.join(file_name) {
                Ok(name) => name,
                Err(_) => continue,
            };
            if let Ok(md) = entry.metadata() {
                entries.push(EntryInfo::new(name, Self::convert_metadata(&md)));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn name(raw: &str) -> EntryName {
        EntryName::parse(raw).unwrap()
    }

    #[test]
    fn test_write_replace_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let written = storage
            .write_replace(&name("a/b.txt"), &mut Cursor::new(b"hello".to_vec()))
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(storage.read(&name("a/b.txt")).unwrap().as_ref(), b"hello");

        storage
            .write_replace(&name("a/b.txt"), &mut Cursor::new(b"bye".to_vec()))
            .unwrap();
        assert_eq!(storage.stat(&name("a/b.txt")).unwrap().unwrap().size, 3);
        assert!(storage.stat(&name("a")).unwrap().unwrap().is_dir());
        assert!(storage.stat(&name("missing")).unwrap().is_none());

        // No temp files left next to the target
        let listed: Vec<_> = storage.list(&name("a")).unwrap().into_iter().map(|e| e.name.to_string()).collect();
        assert_eq!(listed, vec!["a/b.txt"]);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        storage
            .write_replace(&name("d/x"), &mut Cursor::new(b"x".to_vec()))
            .unwrap();

        assert!(matches!(storage.delete(&name("d"), false), Err(FsError::DirectoryNotEmpty(_))));
        storage.delete(&name("d"), true).unwrap();
        assert!(storage.stat(&name("d")).unwrap().is_none());
        assert!(matches!(storage.delete(&name("d"), false), Err(FsError::NoSuchEntry(_))));
    }

    #[test]
    fn test_directory_read_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(matches!(storage.open_read(&name("sub")), Err(FsError::IsDirectory(_))));
    }
}
