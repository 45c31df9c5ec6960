// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-process backend
//!
//! Keeps collections in memory and answers searches exactly. Predicates are
//! evaluated with the same document semantics the database applies, so it
//! stands in for PostgreSQL in tests and local tooling.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::metadata_filter::Predicate;
use crate::core::types::Record;
use crate::core::vector_ops;
use crate::index::IndexDescriptor;
use crate::storage::{
    Backend, BackendError, ExtensionVersion, SearchRequest, SearchRow, TableRef,
};

#[derive(Debug, Default)]
struct Table {
    dimension: usize,
    rows: BTreeMap<String, Record>,
    index: Option<IndexDescriptor>,
}

#[derive(Debug, Default)]
struct State {
    schemas: HashMap<String, BTreeMap<String, Table>>,
}

impl State {
    fn table(&self, table: &TableRef) -> Result<&Table, BackendError> {
        self.schemas
            .get(&table.schema)
            .and_then(|s| s.get(&table.name))
            .ok_or_else(|| BackendError::MissingRelation(table.to_string()))
    }

    fn table_mut(&mut self, table: &TableRef) -> Result<&mut Table, BackendError> {
        self.schemas
            .get_mut(&table.schema)
            .and_then(|s| s.get_mut(&table.name))
            .ok_or_else(|| BackendError::MissingRelation(table.to_string()))
    }
}

#[derive(Clone)]
pub struct MemoryBackend {
    version: ExtensionVersion,
    state: Arc<RwLock<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend reporting extension version 0.7.0.
    pub fn new() -> Self {
        Self::with_version(ExtensionVersion::new(0, 7, 0))
    }

    /// Backend reporting `version`, for exercising capability gates.
    pub fn with_version(version: ExtensionVersion) -> Self {
        Self {
            version,
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn extension_version(&self) -> Result<ExtensionVersion, BackendError> {
        Ok(self.version)
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        state.schemas.entry(schema.to_string()).or_default();
        Ok(())
    }

    async fn collection_dimension(&self, table: &TableRef) -> Result<Option<usize>, BackendError> {
        let state = self.state.read().await;
        Ok(state.table(table).ok().map(|t| t.dimension))
    }

    async fn list_collections(&self, schema: &str) -> Result<Vec<String>, BackendError> {
        let state = self.state.read().await;
        Ok(state
            .schemas
            .get(schema)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(
        &self,
        table: &TableRef,
        dimension: usize,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let schema = state
            .schemas
            .get_mut(&table.schema)
            .ok_or_else(|| BackendError::MissingRelation(table.schema.clone()))?;
        schema.entry(table.name.clone()).or_insert_with(|| Table {
            dimension,
            ..Table::default()
        });
        Ok(())
    }

    async fn drop_collection(&self, table: &TableRef) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        if let Some(schema) = state.schemas.get_mut(&table.schema) {
            schema.remove(&table.name);
        }
        Ok(())
    }

    async fn count(&self, table: &TableRef) -> Result<usize, BackendError> {
        let state = self.state.read().await;
        Ok(state.table(table)?.rows.len())
    }

    async fn upsert(&self, table: &TableRef, records: &[Record]) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let t = state.table_mut(table)?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != t.dimension) {
            return Err(BackendError::MalformedRow(format!(
                "expected {} dimensions, not {} (id '{}')",
                t.dimension,
                bad.vector.len(),
                bad.id
            )));
        }
        for record in records {
            t.rows.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn fetch(&self, table: &TableRef, ids: &[String]) -> Result<Vec<Record>, BackendError> {
        let state = self.state.read().await;
        let t = state.table(table)?;
        Ok(ids.iter().filter_map(|id| t.rows.get(id).cloned()).collect())
    }

    async fn delete_ids(
        &self,
        table: &TableRef,
        ids: &[String],
    ) -> Result<Vec<String>, BackendError> {
        let mut state = self.state.write().await;
        let t = state.table_mut(table)?;
        Ok(ids
            .iter()
            .filter_map(|id| t.rows.remove(id).map(|r| r.id))
            .collect())
    }

    async fn delete_matching(
        &self,
        table: &TableRef,
        predicate: &Predicate,
    ) -> Result<Vec<String>, BackendError> {
        let mut state = self.state.write().await;
        let t = state.table_mut(table)?;
        let doomed: Vec<String> = t
            .rows
            .values()
            .filter(|r| predicate.matches(&r.metadata))
            .map(|r| r.id.clone())
            .collect();
        for id in &doomed {
            t.rows.remove(id);
        }
        Ok(doomed)
    }

    async fn search(
        &self,
        table: &TableRef,
        request: &SearchRequest,
    ) -> Result<Vec<SearchRow>, BackendError> {
        let state = self.state.read().await;
        let t = state.table(table)?;

        let mut scored: Vec<(f64, &Record)> = t
            .rows
            .values()
            .filter(|r| {
                request
                    .predicate
                    .as_ref()
                    .map_or(true, |p| p.matches(&r.metadata))
            })
            .map(|r| (vector_ops::distance(request.measure, &request.vector, &r.vector), r))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(request.limit);

        Ok(scored
            .into_iter()
            .map(|(distance, r)| SearchRow {
                id: r.id.clone(),
                distance: request.include_value.then_some(distance),
                metadata: request.include_metadata.then(|| r.metadata.clone()),
                vector: request.include_vector.then(|| r.vector.clone()),
            })
            .collect())
    }

    async fn index_descriptor(
        &self,
        table: &TableRef,
    ) -> Result<Option<IndexDescriptor>, BackendError> {
        let state = self.state.read().await;
        Ok(state.table(table)?.index.clone())
    }

    async fn replace_index(
        &self,
        table: &TableRef,
        _previous: Option<&IndexDescriptor>,
        next: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        state.table_mut(table)?.index = Some(next.clone());
        Ok(())
    }

    async fn drop_index(
        &self,
        table: &TableRef,
        _descriptor: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        state.table_mut(table)?.index = None;
        Ok(())
    }
}
