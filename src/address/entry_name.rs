/*!
 * Entry Names
 * Normalized relative paths inside one mount point
 */

use crate::core::errors::{FsError, FsResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between a parent address and the entry of a composite address
pub const MOUNT_SEPARATOR: &str = "!/";

/// Normalized, forward-slash separated relative path
///
/// The empty name denotes the root of its file system. Repeated and
/// surrounding slashes collapse; `.` and `..` segments are rejected rather
/// than resolved so a name can never backtrack out of its mount point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryName(String);

impl EntryName {
    /// The root entry of a file system
    #[inline]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse and normalize a relative path
    pub fn parse(raw: &str) -> FsResult<Self> {
        let mut normalized = String::with_capacity(raw.len());

        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            Self::validate_segment(segment, raw)?;
            if !normalized.is_empty() {
                normalized.push('/');
            }
            normalized.push_str(segment);
        }

        Ok(Self(normalized))
    }

    fn validate_segment(segment: &str, raw: &str) -> FsResult<()> {
        if segment == "." || segment == ".." {
            return Err(FsError::InvalidAddress(format!(
                "backtracking segment {:?} in {:?}",
                segment, raw
            )));
        }
        if segment.contains('\0') || segment.contains('\\') {
            return Err(FsError::InvalidAddress(format!(
                "illegal character in entry name {:?}",
                raw
            )));
        }
        if segment.ends_with('!') {
            return Err(FsError::InvalidAddress(format!(
                "segment {:?} is ambiguous next to the mount separator",
                segment
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments, empty for the root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Enclosing directory, `None` for the root
    pub fn parent(&self) -> Option<EntryName> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    /// Strict ancestors from the top down, excluding the root
    pub fn ancestors(&self) -> impl Iterator<Item = EntryName> + '_ {
        self.0
            .match_indices('/')
            .map(move |(idx, _)| Self(self.0[..idx].to_string()))
    }

    /// Append a relative path
    pub fn join(&self, relative: &str) -> FsResult<EntryName> {
        let relative = EntryName::parse(relative)?;
        if self.is_root() {
            return Ok(relative);
        }
        if relative.is_root() {
            return Ok(self.clone());
        }
        Ok(Self(format!("{}/{}", self.0, relative.0)))
    }

    /// Whether `other` lies strictly below this name
    pub fn is_ancestor_of(&self, other: &EntryName) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntryName {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EntryName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntryName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EntryName::parse(&raw).map_err(serde::de::Error::custom)
    }
}
