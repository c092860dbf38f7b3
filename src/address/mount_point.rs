/*!
 * Mount Points
 * Identity of one federated file system instance
 */

use super::address::Address;
use super::entry_name::{EntryName, MOUNT_SEPARATOR};
use super::scheme::Scheme;
use crate::core::errors::{FsError, FsResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Root of one federated file system
///
/// A root mount point is served by the host storage registered for its
/// scheme. A composite mount point is an archive of format `scheme` whose
/// bytes live in the entry named by `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MountPoint {
    Root { scheme: Scheme },
    Composite { scheme: Scheme, parent: Box<Address> },
}

impl MountPoint {
    pub fn root(scheme: Scheme) -> Self {
        MountPoint::Root { scheme }
    }

    /// Archive mount point backed by the entry at `parent`
    ///
    /// The parent address must name an entry, not the root of its mount point.
    pub fn composite(scheme: Scheme, parent: Address) -> FsResult<Self> {
        if parent.entry().is_root() {
            return Err(FsError::InvalidAddress(format!(
                "archive {} needs a backing entry, got mount point root {}",
                scheme, parent
            )));
        }
        Ok(MountPoint::Composite {
            scheme,
            parent: Box::new(parent),
        })
    }

    #[inline]
    pub fn scheme(&self) -> &Scheme {
        match self {
            MountPoint::Root { scheme } | MountPoint::Composite { scheme, .. } => scheme,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self, MountPoint::Root { .. })
    }

    /// Address of the backing archive entry, `None` for roots
    pub fn parent_address(&self) -> Option<&Address> {
        match self {
            MountPoint::Root { .. } => None,
            MountPoint::Composite { parent, .. } => Some(&**parent),
        }
    }

    /// Mount point containing the backing archive entry
    pub fn parent(&self) -> Option<&MountPoint> {
        self.parent_address().map(Address::mount_point)
    }

    /// Nesting depth, zero for roots
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// This mount point followed by each ancestor up to the root
    pub fn lineage(&self) -> Vec<&MountPoint> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Whether this mount point is nested, at any depth, inside `ancestor`
    pub fn is_descendant_of(&self, ancestor: &MountPoint) -> bool {
        self.lineage().into_iter().skip(1).any(|mp| mp == ancestor)
    }

    /// Address of `relative` inside this mount point
    pub fn resolve(&self, relative: &str) -> FsResult<Address> {
        Ok(Address::new(self.clone(), EntryName::parse(relative)?))
    }

    /// Parse a mount point string such as `file:/` or `zip:file:/a.zip!/`
    pub fn parse(raw: &str) -> FsResult<Self> {
        let address = Address::parse(raw)?;
        if !address.entry().is_root() {
            return Err(FsError::InvalidAddress(format!(
                "{:?} names an entry, not a mount point",
                raw
            )));
        }
        Ok(address.into_mount_point())
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MountPoint::Root { scheme } => write!(f, "{}:/", scheme),
            MountPoint::Composite { scheme, parent } => {
                write!(f, "{}:{}{}", scheme, parent, MOUNT_SEPARATOR)
            }
        }
    }
}

impl FromStr for MountPoint {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MountPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MountPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MountPoint::parse(&raw).map_err(serde::de::Error::custom)
    }
}
