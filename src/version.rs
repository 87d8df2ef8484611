//! Repository object versions.
//!
//! The repository bumps an object's version on every write. Callers treat the
//! value as opaque apart from equality and ordering, which the definition cache
//! uses to decide whether a cached entry is still current.
//!
//! ```rust
//! use resource_provisioning::version::ObjectVersion;
//!
//! let v1 = ObjectVersion::initial();
//! let v2 = v1.next();
//! assert!(v2 > v1);
//!
//! let parsed: ObjectVersion = "7".parse().unwrap();
//! assert_eq!(parsed.to_string(), "7");
//! ```

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Monotonic version identifier assigned by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectVersion(u64);

impl ObjectVersion {
    /// Version assigned to a freshly added object.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Create a version from a repository sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The version the next write will carry.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Raw sequence number, for diagnostics.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid object version format: {0}")]
pub struct VersionParseError(String);

impl FromStr for ObjectVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| VersionParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_writes() {
        let v = ObjectVersion::initial();
        assert!(v.next() > v);
        assert_eq!(v.next().next().sequence(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<ObjectVersion>().is_err());
        assert_eq!(" 12 ".parse::<ObjectVersion>().unwrap(), ObjectVersion::from_sequence(12));
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&ObjectVersion::from_sequence(5)).unwrap();
        assert_eq!(json, "5");
    }
}
