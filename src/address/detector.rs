/*!
 * Archive Detection
 * Maps file-name suffixes to archive schemes to build composite addresses
 */

use super::address::Address;
use super::entry_name::EntryName;
use super::mount_point::MountPoint;
use super::scheme::Scheme;
use crate::core::errors::{FsError, FsResult};

/// Suffix-based archive detector
///
/// Turns `file:/a/b.zip/c.txt` into `zip:file:/a/b.zip!/c.txt`. Detection is
/// by name only; a matching file that is not a valid archive is handled by
/// the false-positive layer of its controller chain.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDetector {
    /// (lowercase suffix, scheme), longest suffix first
    suffixes: Vec<(String, Scheme)>,
}

impl ArchiveDetector {
    /// Detector that recognizes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Detector for the bundled drivers
    pub fn standard() -> Self {
        [
            (".zip", "zip"),
            (".jar", "zip"),
            (".tar", "tar"),
            (".ezip", "ezip"),
            (".tar.aes", "etar"),
        ]
        .into_iter()
        .filter_map(|(suffix, name)| Scheme::new(name).ok().map(|scheme| (suffix, scheme)))
        .fold(Self::empty(), |detector, (suffix, scheme)| detector.with_scheme(suffix, scheme))
    }

    /// Register `suffix` (for example `.zip`) for the scheme named `scheme`
    ///
    /// Fails with InvalidAddress when `scheme` is not a valid scheme name.
    pub fn with(self, suffix: &str, scheme: &str) -> FsResult<Self> {
        Ok(self.with_scheme(suffix, Scheme::new(scheme)?))
    }

    /// Register `suffix` for an already validated scheme
    pub fn with_scheme(mut self, suffix: &str, scheme: Scheme) -> Self {
        let suffix = suffix.to_ascii_lowercase();
        self.suffixes.retain(|(s, _)| s != &suffix);
        self.suffixes.push((suffix, scheme));
        self.suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Scheme for a single file name, if it carries a known suffix
    pub fn scheme_for(&self, file_name: &str) -> Option<&Scheme> {
        let lower = file_name.to_ascii_lowercase();
        self.suffixes
            .iter()
            .find(|(suffix, _)| lower.len() > suffix.len() && lower.ends_with(suffix.as_str()))
            .map(|(_, scheme)| scheme)
    }

    /// Build a composite address from a plain root path
    pub fn detect(&self, raw: &str) -> FsResult<Address> {
        let plain = Address::parse(raw)?;
        if !plain.mount_point().is_root() {
            return Err(FsError::InvalidAddress(format!(
                "detection expects a plain root path, got {:?}",
                raw
            )));
        }

        let mut mount_point = plain.mount_point().clone();
        let mut entry = EntryName::root();

        for segment in plain.entry().segments() {
            entry = entry.join(segment)?;
            if let Some(scheme) = self.scheme_for(segment) {
                let backing = Address::new(mount_point, entry);
                mount_point = MountPoint::composite(scheme.clone(), backing)?;
                entry = EntryName::root();
            }
        }

        Ok(Address::new(mount_point, entry))
    }
}
