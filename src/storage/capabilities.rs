// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Engine capability negotiation
//!
//! The vector extension reports a version string; features are gated on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::config::{MIN_HNSW_VERSION, MIN_L1_VERSION};
use crate::index::{IndexMeasure, IndexMethod};
use crate::storage::BackendError;

/// Three-part extension version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExtensionVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ExtensionVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    const fn from_tuple(t: (u32, u32, u32)) -> Self {
        Self::new(t.0, t.1, t.2)
    }

    /// Parse `major.minor[.patch]`, ignoring any non-numeric suffix such as `-dev`.
    pub fn parse(raw: &str) -> Result<Self, BackendError> {
        let invalid = || BackendError::Version(raw.to_string());

        let mut parts = raw.trim().splitn(3, '.');
        let mut next = |required: bool| -> Result<u32, BackendError> {
            match parts.next() {
                Some(part) => {
                    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                    digits.parse().map_err(|_| invalid())
                }
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }
}

impl FromStr for ExtensionVersion {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExtensionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Features available on the connected engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub version: ExtensionVersion,
}

impl Capabilities {
    pub fn new(version: ExtensionVersion) -> Self {
        Self { version }
    }

    pub fn supports_hnsw(&self) -> bool {
        self.version >= ExtensionVersion::from_tuple(MIN_HNSW_VERSION)
    }

    pub fn supports_l1(&self) -> bool {
        self.version >= ExtensionVersion::from_tuple(MIN_L1_VERSION)
    }

    /// Whether a concrete method can be built at all.
    pub fn supports_method(&self, method: IndexMethod) -> bool {
        match method {
            IndexMethod::Auto => true,
            IndexMethod::IvfFlat => true,
            IndexMethod::Hnsw => self.supports_hnsw(),
        }
    }

    /// Whether `measure` can be queried at all on this engine.
    pub fn supports_measure(&self, measure: IndexMeasure) -> bool {
        match measure {
            IndexMeasure::L1Distance => self.supports_l1(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!(ExtensionVersion::parse("0.5.1").unwrap(), ExtensionVersion::new(0, 5, 1));
        assert_eq!(ExtensionVersion::parse("0.4").unwrap(), ExtensionVersion::new(0, 4, 0));
        assert_eq!(
            ExtensionVersion::parse("0.8.0-dev").unwrap(),
            ExtensionVersion::new(0, 8, 0)
        );
        assert!(ExtensionVersion::parse("vector").is_err());
        assert!(ExtensionVersion::parse("1").is_err());
    }

    #[test]
    fn test_hnsw_gate() {
        let old = Capabilities::new(ExtensionVersion::parse("0.4.4").unwrap());
        assert!(!old.supports_hnsw());
        assert!(!old.supports_method(IndexMethod::Hnsw));
        assert!(old.supports_method(IndexMethod::IvfFlat));

        let current = Capabilities::new(ExtensionVersion::parse("0.5.0").unwrap());
        assert!(current.supports_hnsw());
        assert!(!current.supports_l1());
    }

    #[test]
    fn test_version_ordering() {
        assert!(ExtensionVersion::new(0, 10, 0) > ExtensionVersion::new(0, 9, 9));
        assert!(ExtensionVersion::new(1, 0, 0) > ExtensionVersion::new(0, 99, 0));
    }
}
