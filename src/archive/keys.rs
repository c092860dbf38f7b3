/*!
 * Key Management Contract
 * Encrypted-archive drivers obtain and release keys by mount point
 */

use crate::address::MountPoint;
use crate::core::errors::{FsError, FsResult};
use crate::core::limits::ARCHIVE_KEY_LEN;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{compiler_fence, AtomicUsize, Ordering};

/// Why a key is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    Decrypt,
    Encrypt,
}

/// Symmetric archive key, zeroed on drop
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveKey([u8; ARCHIVE_KEY_LEN]);

impl ArchiveKey {
    pub fn new(bytes: [u8; ARCHIVE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> FsResult<Self> {
        let key: [u8; ARCHIVE_KEY_LEN] = bytes.try_into().map_err(|_| {
            FsError::Key(format!("expected {} key bytes, got {}", ARCHIVE_KEY_LEN, bytes.len()))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; ARCHIVE_KEY_LEN] {
        &self.0
    }
}

impl Drop for ArchiveKey {
    fn drop(&mut self) {
        self.0.fill(0);
        compiler_fence(Ordering::SeqCst);
    }
}

impl fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ArchiveKey(..)")
    }
}

/// Source of archive keys
///
/// The kernel passes mount points through opaquely; implementations may
/// prompt, consult a keyring or cache. Every successful `obtain_key` is
/// paired with one `release_key`.
pub trait KeyManager: Send + Sync {
    fn obtain_key(&self, mount_point: &MountPoint, purpose: KeyPurpose) -> FsResult<ArchiveKey>;

    fn release_key(&self, mount_point: &MountPoint);
}

/// In-memory keys per mount point, with an optional fallback key
#[derive(Default)]
pub struct StaticKeyManager {
    keys: DashMap<MountPoint, ArchiveKey, ahash::RandomState>,
    fallback: Option<ArchiveKey>,
    obtained: AtomicUsize,
    released: AtomicUsize,
}

impl StaticKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used for mount points without their own entry
    pub fn with_fallback(mut self, key: ArchiveKey) -> Self {
        self.fallback = Some(key);
        self
    }

    pub fn insert(&self, mount_point: MountPoint, key: ArchiveKey) {
        self.keys.insert(mount_point, key);
    }

    pub fn remove(&self, mount_point: &MountPoint) {
        self.keys.remove(mount_point);
    }

    /// Number of keys handed out
    pub fn obtained(&self) -> usize {
        self.obtained.load(Ordering::SeqCst)
    }

    /// Number of keys given back
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl KeyManager for StaticKeyManager {
    fn obtain_key(&self, mount_point: &MountPoint, _purpose: KeyPurpose) -> FsResult<ArchiveKey> {
        let key = match self.keys.get(mount_point) {
            Some(key) => key.value().clone(),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| FsError::Key(format!("no key for {}", mount_point)))?,
        };
        self.obtained.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    fn release_key(&self, _mount_point: &MountPoint) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for StaticKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StaticKeyManager")
            .field("keys", &self.keys.len())
            .field("obtained", &self.obtained())
            .field("released", &self.released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_counters() {
        let mp = MountPoint::parse("ezip:mem:/a.ezip!/").unwrap();
        let other = MountPoint::parse("ezip:mem:/b.ezip!/").unwrap();
        let manager = StaticKeyManager::new();
        manager.insert(mp.clone(), ArchiveKey::new([1; ARCHIVE_KEY_LEN]));

        assert!(manager.obtain_key(&mp, KeyPurpose::Decrypt).is_ok());
        assert!(matches!(manager.obtain_key(&other, KeyPurpose::Decrypt), Err(FsError::Key(_))));
        manager.release_key(&mp);
        assert_eq!(manager.obtained(), 1);
        assert_eq!(manager.released(), 1);

        let manager = StaticKeyManager::new().with_fallback(ArchiveKey::new([2; ARCHIVE_KEY_LEN]));
        assert_eq!(
            manager.obtain_key(&other, KeyPurpose::Encrypt).unwrap().as_bytes(),
            &[2; ARCHIVE_KEY_LEN]
        );
    }

    #[test]
    fn test_key_length() {
        assert!(ArchiveKey::from_slice(&[0; 16]).is_err());
        assert!(ArchiveKey::from_slice(&[0; ARCHIVE_KEY_LEN]).is_ok());
        assert_eq!(format!("{:?}", ArchiveKey::new([9; ARCHIVE_KEY_LEN])), "ArchiveKey(..)");
    }
}
