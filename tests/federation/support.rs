/*!
 * Shared fixtures for federation tests
 */

#![allow(dead_code)]

use bytes::Bytes;
use fedfs_kernel::archive::{ArchiveDriver, ArchiveReader, DriverContext, EncodeEntry};
use fedfs_kernel::{Address, EntryMeta, EntryName, FsManager, KernelConfig, MemStorage, MountPoint, ZipDriver};
use std::time::SystemTime;

pub fn addr(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

pub fn mount_point(raw: &str) -> MountPoint {
    MountPoint::parse(raw).unwrap()
}

pub fn name(raw: &str) -> EntryName {
    EntryName::parse(raw).unwrap()
}

pub fn test_config() -> KernelConfig {
    KernelConfig {
        reap_on_start: false,
        ..KernelConfig::default()
    }
}

pub fn manager_with(storage: &MemStorage, config: KernelConfig) -> FsManager {
    FsManager::builder()
        .with_config(config)
        .with_storage("mem", storage.clone())
        .build()
        .unwrap()
}

pub fn manager(storage: &MemStorage) -> FsManager {
    manager_with(storage, test_config())
}

/// Stored ZIP archive holding `files`
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Bytes {
    let entries = files
        .iter()
        .map(|(entry, data)| EncodeEntry {
            name: name(entry),
            meta: EntryMeta::file(data.len() as u64, SystemTime::now()),
            content: Some(Bytes::copy_from_slice(data)),
        })
        .collect();
    let mp = mount_point("zip:mem:/fixture.zip!/");
    let mut out = Vec::new();
    ZipDriver::new()
        .encode(&DriverContext::new(&mp), entries, &mut out)
        .unwrap();
    Bytes::from(out)
}

/// Content of `entry` inside the ZIP archive `data`
pub fn zip_entry(data: Bytes, entry: &str) -> Option<Bytes> {
    let mp = mount_point("zip:mem:/fixture.zip!/");
    let reader = ZipDriver::new().decode(&DriverContext::new(&mp), data).unwrap();
    reader.read(&name(entry)).ok()
}

/// Sorted entry names of a listing
pub fn names(entries: &[fedfs_kernel::EntryInfo]) -> Vec<String> {
    let mut names: Vec<String> = entries.iter().map(|info| info.name.to_string()).collect();
    names.sort();
    names
}
