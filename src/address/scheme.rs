/*!
 * Address Scheme
 * Validated URI scheme naming a host storage provider or archive format
 */

use crate::core::errors::{FsError, FsResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// URI scheme, case-folded to lowercase
///
/// Grammar: a letter followed by letters, digits, `+`, `-` or `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scheme(String);

impl Scheme {
    pub fn new(raw: &str) -> FsResult<Self> {
        let mut chars = raw.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => {
                return Err(FsError::InvalidAddress(format!(
                    "scheme must start with a letter: {:?}",
                    raw
                )))
            }
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
            return Err(FsError::InvalidAddress(format!(
                "illegal character in scheme: {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Scheme {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Scheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Scheme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Scheme::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_validation() {
        assert_eq!(Scheme::new("ZIP").unwrap().as_str(), "zip");
        assert!(Scheme::new("tar.aes").is_ok());
        assert!(Scheme::new("x-b+c").is_ok());
        assert!(Scheme::new("").is_err());
        assert!(Scheme::new("1zip").is_err());
        assert!(Scheme::new("zi p").is_err());
        assert!(Scheme::new("zip:").is_err());
    }
}
