// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Storage backends
//!
//! [`Backend`] is the seam between collections and the database. Every call
//! is self-contained: it acquires a session, runs in its own transaction and
//! releases it on all exit paths.

pub mod capabilities;
pub mod memory;
pub mod postgres;
pub mod sql;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::core::metadata_filter::Predicate;
use crate::core::types::{Metadata, Record};
use crate::index::{IndexDescriptor, IndexMeasure};

pub use capabilities::{Capabilities, ExtensionVersion};
pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error("Unrecognized vector extension version: {0}")]
    Version(String),

    #[error("Vector extension is not installed")]
    MissingExtension,

    #[error("Relation does not exist: {0}")]
    MissingRelation(String),

    #[error("Malformed row: {0}")]
    MalformedRow(String),
}

/// Schema-qualified collection table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `"schema"."name"`, safe to splice into a statement.
    pub fn qualified(&self) -> String {
        format!("{}.{}", sql::quote_ident(&self.schema), sql::quote_ident(&self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Nearest-neighbour query handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub measure: IndexMeasure,
    pub limit: usize,
    pub predicate: Option<Predicate>,
    pub include_value: bool,
    pub include_metadata: bool,
    pub include_vector: bool,
    pub probes: u32,
    /// `None` when the engine has no graph index to tune
    pub ef_search: Option<u32>,
}

/// One result row; optional columns are present only when requested.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRow {
    pub id: String,
    pub distance: Option<f64>,
    pub metadata: Option<Metadata>,
    pub vector: Option<Vec<f32>>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Installed vector extension version.
    async fn extension_version(&self) -> Result<ExtensionVersion, BackendError>;

    /// Create the namespace (and the extension) if missing.
    async fn ensure_schema(&self, schema: &str) -> Result<(), BackendError>;

    /// Dimension of an existing collection, `None` when the table is absent.
    async fn collection_dimension(&self, table: &TableRef) -> Result<Option<usize>, BackendError>;

    async fn list_collections(&self, schema: &str) -> Result<Vec<String>, BackendError>;

    /// Create the table and its metadata index if they do not exist.
    async fn create_collection(&self, table: &TableRef, dimension: usize)
        -> Result<(), BackendError>;

    /// Drop the table and its index descriptor; absent tables are ignored.
    async fn drop_collection(&self, table: &TableRef) -> Result<(), BackendError>;

    async fn count(&self, table: &TableRef) -> Result<usize, BackendError>;

    /// Insert or overwrite by id. Ids in `records` are unique.
    async fn upsert(&self, table: &TableRef, records: &[Record]) -> Result<(), BackendError>;

    async fn fetch(&self, table: &TableRef, ids: &[String]) -> Result<Vec<Record>, BackendError>;

    /// Delete by id, returning the ids that existed.
    async fn delete_ids(&self, table: &TableRef, ids: &[String])
        -> Result<Vec<String>, BackendError>;

    /// Delete every record matching `predicate`, returning their ids.
    async fn delete_matching(
        &self,
        table: &TableRef,
        predicate: &Predicate,
    ) -> Result<Vec<String>, BackendError>;

    async fn search(
        &self,
        table: &TableRef,
        request: &SearchRequest,
    ) -> Result<Vec<SearchRow>, BackendError>;

    /// Persisted descriptor of the collection's index.
    async fn index_descriptor(
        &self,
        table: &TableRef,
    ) -> Result<Option<IndexDescriptor>, BackendError>;

    /// Drop `previous` (if any), build `next` and persist its descriptor, atomically.
    async fn replace_index(
        &self,
        table: &TableRef,
        previous: Option<&IndexDescriptor>,
        next: &IndexDescriptor,
    ) -> Result<(), BackendError>;

    async fn drop_index(
        &self,
        table: &TableRef,
        descriptor: &IndexDescriptor,
    ) -> Result<(), BackendError>;

    /// Release held connections.
    fn close(&self) {}
}

/// `[1,2,3]` text form of a vector, as the extension parses it.
pub(crate) fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub(crate) fn parse_vector_literal(raw: &str) -> Result<Vec<f32>, BackendError> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| BackendError::MalformedRow(format!("vector literal: {}", raw)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| BackendError::MalformedRow(format!("vector element: {}", part)))
        })
        .collect()
}
