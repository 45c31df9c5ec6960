// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Graph (HNSW) index parameters

use serde::{Deserialize, Serialize};

use crate::core::config::{DEFAULT_HNSW_EF_CONSTRUCTION, DEFAULT_HNSW_M};
use crate::core::error::{Result, VecsError};

/// Build arguments for a graph index
///
/// Either field may be left unset to keep its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswArgs {
    /// Maximum connections per node per layer (default 16)
    pub m: Option<u32>,
    /// Candidate list size while constructing the graph (default 64)
    pub ef_construction: Option<u32>,
}

impl Default for HnswArgs {
    fn default() -> Self {
        Self {
            m: Some(DEFAULT_HNSW_M),
            ef_construction: Some(DEFAULT_HNSW_EF_CONSTRUCTION),
        }
    }
}

impl HnswArgs {
    pub fn new(m: u32, ef_construction: u32) -> Self {
        Self {
            m: Some(m),
            ef_construction: Some(ef_construction),
        }
    }

    pub fn m(&self) -> u32 {
        self.m.unwrap_or(DEFAULT_HNSW_M)
    }

    pub fn ef_construction(&self) -> u32 {
        self.ef_construction.unwrap_or(DEFAULT_HNSW_EF_CONSTRUCTION)
    }

    /// Bounds enforced by the engine, checked up front.
    pub fn validate(&self) -> Result<()> {
        let m = self.m();
        let ef_construction = self.ef_construction();

        if !(2..=100).contains(&m) {
            return Err(VecsError::arg("m must be between 2 and 100"));
        }
        if !(4..=1000).contains(&ef_construction) {
            return Err(VecsError::arg("ef_construction must be between 4 and 1000"));
        }
        if ef_construction < 2 * m {
            return Err(VecsError::arg("ef_construction must be >= 2 * m"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = HnswArgs::default();
        assert_eq!(args.m(), 16);
        assert_eq!(args.ef_construction(), 64);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_partial_args_keep_defaults() {
        let args = HnswArgs {
            m: Some(8),
            ef_construction: None,
        };
        assert_eq!(args.m(), 8);
        assert_eq!(args.ef_construction(), 64);
    }

    #[test]
    fn test_out_of_range() {
        assert!(HnswArgs::new(1, 64).validate().is_err());
        assert!(HnswArgs::new(16, 2000).validate().is_err());
        assert!(HnswArgs::new(32, 40).validate().is_err());
    }
}
