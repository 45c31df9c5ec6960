// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use futures::stream::{StreamExt, TryStreamExt};

use crate::adapter::base::{AdapterContext, AdapterStep, RecordStream};
use crate::core::types::{AdaptedRecord, MediaRecord};

/// Passes records through unchanged while declaring their dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoOp {
    pub dimension: usize,
}

impl NoOp {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl AdapterStep for NoOp {
    fn exported_dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        _context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord> {
        records.map_ok(AdaptedRecord::from).boxed()
    }
}
