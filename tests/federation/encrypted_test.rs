/*!
 * Encrypted Archive Tests
 * Key lifecycle and round trips through the encrypted drivers
 */

use crate::support::{addr, mount_point, name, names, test_config};
use fedfs_kernel::{ArchiveKey, FsError, FsManager, KeyManager, MemStorage, StaticKeyManager, SyncOptions};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn manager_with_keys(storage: &MemStorage, keys: &Arc<StaticKeyManager>) -> FsManager {
    let keys: Arc<dyn KeyManager> = keys.clone();
    FsManager::builder()
        .with_config(test_config())
        .with_storage("mem", storage.clone())
        .with_key_manager(keys)
        .build()
        .unwrap()
}

#[test]
fn test_encrypted_zip_roundtrip() {
    let storage = MemStorage::new();
    let keys = Arc::new(StaticKeyManager::new().with_fallback(ArchiveKey::new([7u8; 32])));

    let m = manager_with_keys(&storage, &keys);
    m.write(&addr("ezip:mem:/vault.ezip!/secret.txt"), b"classified")
        .unwrap();
    m.write(&addr("ezip:mem:/vault.ezip!/dir/more.txt"), b"more")
        .unwrap();
    m.sync_all(&SyncOptions::default()).unwrap();

    let stored = storage.get(&name("vault.ezip")).unwrap();
    assert!(stored.starts_with(b"FEDFSAE1"));
    assert!(!stored.windows(10).any(|w| w == b"classified"));

    let reread = manager_with_keys(&storage, &keys);
    assert_eq!(
        reread.read(&addr("ezip:mem:/vault.ezip!/secret.txt")).unwrap().as_ref(),
        b"classified"
    );
    assert_eq!(
        names(&reread.entries(&mount_point("ezip:mem:/vault.ezip!/")).unwrap()),
        vec!["dir", "dir/more.txt", "secret.txt"]
    );

    assert!(keys.obtained() > 0);
    assert_eq!(keys.obtained(), keys.released());
}

#[test]
fn test_encrypted_tar_roundtrip() {
    let storage = MemStorage::new();
    let keys = Arc::new(StaticKeyManager::new());
    keys.insert(mount_point("etar:mem:/backup.tar.aes!/"), ArchiveKey::new([1u8; 32]));

    let m = manager_with_keys(&storage, &keys);
    let address = m.detect("mem:/backup.tar.aes/log.txt").unwrap();
    assert_eq!(address.to_string(), "etar:mem:/backup.tar.aes!/log.txt");
    m.write(&address, b"line").unwrap();
    m.sync_all(&SyncOptions::default()).unwrap();

    let reread = manager_with_keys(&storage, &keys);
    assert_eq!(reread.read(&address).unwrap().as_ref(), b"line");
    assert_eq!(keys.obtained(), keys.released());
}

#[test]
fn test_wrong_key_fails_with_key_error() {
    let storage = MemStorage::new();
    let right = Arc::new(StaticKeyManager::new().with_fallback(ArchiveKey::new([7u8; 32])));
    let m = manager_with_keys(&storage, &right);
    m.write(&addr("ezip:mem:/vault.ezip!/secret.txt"), b"classified")
        .unwrap();
    m.sync_all(&SyncOptions::default()).unwrap();

    let wrong = Arc::new(StaticKeyManager::new().with_fallback(ArchiveKey::new([9u8; 32])));
    let other = manager_with_keys(&storage, &wrong);
    assert!(matches!(
        other.read(&addr("ezip:mem:/vault.ezip!/secret.txt")),
        Err(FsError::Key(_))
    ));
    assert_eq!(wrong.obtained(), wrong.released());
}

#[test]
fn test_missing_key_fails_with_key_error() {
    let storage = MemStorage::new();
    let none = Arc::new(StaticKeyManager::new());
    let m = manager_with_keys(&storage, &none);
    m.write(&addr("ezip:mem:/vault.ezip!/x"), b"x").unwrap();

    let error = m.sync_all(&SyncOptions::default()).unwrap_err();
    assert!(matches!(error.errors[0].source, FsError::Key(_)));
    assert_eq!(storage.write_count(), 0);
}
