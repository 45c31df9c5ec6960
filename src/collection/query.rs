// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Similarity query options and results

use serde_json::Value as JsonValue;

use crate::core::config::MAX_QUERY_LIMIT;
use crate::core::error::{Result, VecsError};
use crate::core::types::Metadata;
use crate::index::IndexMeasure;
use crate::storage::SearchRow;

/// Options of `Collection::query`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub limit: usize,
    pub filters: Option<JsonValue>,
    pub measure: IndexMeasure,
    pub include_value: bool,
    pub include_metadata: bool,
    pub include_vector: bool,
    /// Inverted lists probed; defaults to 10
    pub probes: Option<u32>,
    /// Graph search candidate list size; defaults to 40
    pub ef_search: Option<u32>,
    pub skip_adapter: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filters: None,
            measure: IndexMeasure::CosineDistance,
            include_value: false,
            include_metadata: false,
            include_vector: false,
            probes: None,
            ef_search: None,
            skip_adapter: false,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn filters(mut self, filters: JsonValue) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn measure(mut self, measure: IndexMeasure) -> Self {
        self.measure = measure;
        self
    }

    pub fn include_value(mut self, include: bool) -> Self {
        self.include_value = include;
        self
    }

    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn include_vector(mut self, include: bool) -> Self {
        self.include_vector = include;
        self
    }

    pub fn probes(mut self, probes: u32) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn ef_search(mut self, ef_search: u32) -> Self {
        self.ef_search = Some(ef_search);
        self
    }

    pub fn skip_adapter(mut self, skip: bool) -> Self {
        self.skip_adapter = skip;
        self
    }

    /// Whether anything beyond ids was requested.
    pub fn projects_rows(&self) -> bool {
        self.include_value || self.include_metadata || self.include_vector
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.limit > MAX_QUERY_LIMIT {
            return Err(VecsError::arg(format!("limit must be <= {}", MAX_QUERY_LIMIT)));
        }
        if self.probes == Some(0) {
            return Err(VecsError::arg("probes must be >= 1"));
        }
        if self.ef_search == Some(0) {
            return Err(VecsError::arg("ef_search must be >= 1"));
        }
        Ok(())
    }
}

/// A projected result row: `(id, [distance], [metadata], [vector])`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub id: String,
    pub distance: Option<f64>,
    pub metadata: Option<Metadata>,
    pub vector: Option<Vec<f32>>,
}

impl From<SearchRow> for QueryRow {
    fn from(row: SearchRow) -> Self {
        Self {
            id: row.id,
            distance: row.distance,
            metadata: row.metadata,
            vector: row.vector,
        }
    }
}

/// Bare ids when no projection was requested, rows otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Ids(Vec<String>),
    Rows(Vec<QueryRow>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Ids(ids) => ids.len(),
            QueryResult::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Result ids in rank order, whichever shape was returned.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            QueryResult::Ids(ids) => ids.iter().map(String::as_str).collect(),
            QueryResult::Rows(rows) => rows.iter().map(|r| r.id.as_str()).collect(),
        }
    }

    pub fn into_rows(self) -> Option<Vec<QueryRow>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Ids(_) => None,
        }
    }
}
