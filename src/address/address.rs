/*!
 * Addresses
 * Globally unique (mount point, entry name) resource identifiers
 */

use super::entry_name::{EntryName, MOUNT_SEPARATOR};
use super::mount_point::MountPoint;
use super::scheme::Scheme;
use crate::core::errors::{FsError, FsResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A resource inside the federation
///
/// String forms:
/// - root: `file:/dir/a.txt`
/// - composite: `zip:file:/dir/a.zip!/a.txt`, nesting recursively as
///   `zip:zip:file:/a.zip!/b.zip!/c.txt`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    mount_point: MountPoint,
    entry: EntryName,
}

impl Address {
    pub fn new(mount_point: MountPoint, entry: EntryName) -> Self {
        Self { mount_point, entry }
    }

    /// Address of `relative` inside `mount_point`
    pub fn resolve(mount_point: &MountPoint, relative: &str) -> FsResult<Self> {
        mount_point.resolve(relative)
    }

    /// Parse the composite grammar `scheme:parentAddress!/entry`, recursively
    pub fn parse(raw: &str) -> FsResult<Self> {
        match raw.rfind(MOUNT_SEPARATOR) {
            Some(idx) => {
                let (scheme, parent) = split_scheme(&raw[..idx])?;
                let parent = Address::parse(parent)?;
                let entry = EntryName::parse(&raw[idx + MOUNT_SEPARATOR.len()..])?;
                Ok(Self {
                    mount_point: MountPoint::composite(scheme, parent)?,
                    entry,
                })
            }
            None => {
                let (scheme, path) = split_scheme(raw)?;
                if !path.starts_with('/') {
                    return Err(FsError::InvalidAddress(format!(
                        "root address path must be absolute: {:?}",
                        raw
                    )));
                }
                Ok(Self {
                    mount_point: MountPoint::root(scheme),
                    entry: EntryName::parse(path)?,
                })
            }
        }
    }

    #[inline]
    pub fn mount_point(&self) -> &MountPoint {
        &self.mount_point
    }

    #[inline]
    pub fn entry(&self) -> &EntryName {
        &self.entry
    }

    pub fn into_mount_point(self) -> MountPoint {
        self.mount_point
    }

    /// Mount point enclosing this address's own mount point
    pub fn parent(&self) -> Option<MountPoint> {
        self.mount_point.parent().cloned()
    }

    /// Append a relative path to the entry, staying in the same mount point
    pub fn join(&self, relative: &str) -> FsResult<Address> {
        Ok(Self {
            mount_point: self.mount_point.clone(),
            entry: self.entry.join(relative)?,
        })
    }

    /// Treat the entry at this address as an archive of format `scheme`
    pub fn mount_as(&self, scheme: Scheme) -> FsResult<MountPoint> {
        MountPoint::composite(scheme, self.clone())
    }
}

fn split_scheme(raw: &str) -> FsResult<(Scheme, &str)> {
    match raw.find(':') {
        Some(idx) => Ok((Scheme::new(&raw[..idx])?, &raw[idx + 1..])),
        None => Err(FsError::InvalidAddress(format!("missing scheme in {:?}", raw))),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Both mount point forms end in '/', so the entry appends directly
        write!(f, "{}{}", self.mount_point, self.entry)
    }
}

impl FromStr for Address {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root() {
        let address = Address::parse("file:/dir//a.txt").unwrap();
        assert!(address.mount_point().is_root());
        assert_eq!(address.entry().as_str(), "dir/a.txt");
        assert_eq!(address.to_string(), "file:/dir/a.txt");
    }

    #[test]
    fn test_parse_nested() {
        let address = Address::parse("zip:zip:file:/a.zip!/nested.zip!/x.txt").unwrap();
        assert_eq!(address.entry().as_str(), "x.txt");
        assert_eq!(address.mount_point().depth(), 2);

        let backing = address.mount_point().parent_address().unwrap();
        assert_eq!(backing.to_string(), "zip:file:/a.zip!/nested.zip");
        assert_eq!(
            address.parent().unwrap().to_string(),
            "zip:file:/a.zip!/"
        );
        assert_eq!(address.to_string(), "zip:zip:file:/a.zip!/nested.zip!/x.txt");
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "a.txt",
            "file:a.txt",
            "zip:/a.zip!/x",
            "zip:file:/a.zip!/../x",
            "9p:/x",
            "zip:file:/!/x",
        ] {
            assert!(
                matches!(Address::parse(bad), Err(FsError::InvalidAddress(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_join_and_mount_as() {
        let address = Address::parse("file:/data").unwrap();
        let archive = address.join("a.tar").unwrap();
        let mp = archive.mount_as(Scheme::new("tar").unwrap()).unwrap();
        assert_eq!(mp.to_string(), "tar:file:/data/a.tar!/");

        let root = Address::parse("file:/").unwrap();
        assert!(root.mount_as(Scheme::new("zip").unwrap()).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let address = Address::parse("zip:file:/a.zip!/x.txt").unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, r#""zip:file:/a.zip!/x.txt""#);
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
