// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Inverted-list (IVFFlat) index parameters

use serde::{Deserialize, Serialize};

use crate::core::config::{IVF_MIN_LISTS, IVF_RECORDS_PER_LIST, IVF_SQRT_THRESHOLD};
use crate::core::error::{Result, VecsError};

/// Build arguments for an inverted-list index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfFlatArgs {
    /// Number of list centroids
    pub n_lists: usize,
}

impl IvfFlatArgs {
    pub fn new(n_lists: usize) -> Self {
        Self { n_lists }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_lists == 0 {
            return Err(VecsError::arg("n_lists must be >= 1"));
        }
        Ok(())
    }
}

/// List count used when the caller does not pick one.
///
/// `max(records / 1000, 30)` below one million records, `sqrt(records)` above.
pub fn default_n_lists(n_records: usize) -> usize {
    if n_records < IVF_SQRT_THRESHOLD {
        (n_records / IVF_RECORDS_PER_LIST).max(IVF_MIN_LISTS)
    } else {
        (n_records as f64).sqrt() as usize
    }
}
