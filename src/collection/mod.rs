// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Collections
//!
//! A collection is one table of `(id, vec, metadata)` records with a fixed
//! dimension, an adapter pipeline feeding it, and at most one similarity index.

pub mod query;

use futures::stream::{StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::adapter::{record_stream, Adapter, AdapterContext, NoOp};
use crate::client::ClientContext;
use crate::core::config::{DEFAULT_EF_SEARCH, DEFAULT_PROBES};
use crate::core::error::{Result, VecsError};
use crate::core::metadata_filter::Predicate;
use crate::core::types::{AdaptedRecord, Media, MediaRecord, Record};
use crate::index::{
    plan_index, resolve_method, IndexCoverage, IndexDescriptor, IndexMeasure, IndexMethod,
    IndexRequest, IndexState,
};
use crate::storage::{SearchRequest, TableRef};

pub use query::{QueryOptions, QueryResult, QueryRow};

/// Longest identifier the database keeps without truncation.
const MAX_NAME_BYTES: usize = 63;

/// Options for `Client::get_or_create_collection`
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    pub dimension: Option<usize>,
    pub adapter: Option<Adapter>,
    pub schema: Option<String>,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VecsError::arg("collection name must not be empty"));
    }
    if name.starts_with('_') {
        return Err(VecsError::arg(format!(
            "collection name '{}' must not start with '_'",
            name
        )));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(VecsError::arg(format!(
            "collection name must be at most {} bytes",
            MAX_NAME_BYTES
        )));
    }
    Ok(())
}

/// Settle a collection's dimension from its possible sources.
///
/// An explicit dimension and an adapter-declared one must agree, and whichever
/// is given must agree with an already stored collection. Without either, the
/// stored dimension is used.
pub(crate) fn resolve_dimension(
    explicit: Option<usize>,
    adapter: Option<usize>,
    stored: Option<usize>,
) -> Result<usize> {
    let mismatch = || {
        VecsError::MismatchedDimension(
            "Dimensions reported by adapter, dimension, and collection do not match".to_string(),
        )
    };

    let declared = match (explicit, adapter) {
        (Some(e), Some(a)) if e != a => return Err(mismatch()),
        (e, a) => e.or(a),
    };

    let dimension = match (declared, stored) {
        (Some(d), Some(s)) if d != s => return Err(mismatch()),
        (d, s) => d.or(s),
    };

    match dimension {
        Some(0) => Err(VecsError::arg("dimension must be >= 1")),
        Some(d) => Ok(d),
        None => Err(VecsError::arg(
            "One of dimension or adapter must provide a dimension",
        )),
    }
}

/// Collapse repeated ids to their last occurrence, keeping first-seen order.
fn dedupe_last_wins(batch: Vec<Record>) -> Vec<Record> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(batch.len());
    let mut unique: Vec<Record> = Vec::with_capacity(batch.len());
    for record in batch {
        match positions.get(&record.id) {
            Some(&ix) => unique[ix] = record,
            None => {
                positions.insert(record.id.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

pub struct Collection {
    name: String,
    dimension: usize,
    table: TableRef,
    adapter: Adapter,
    context: Arc<ClientContext>,
    index_state: Mutex<IndexState>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("schema", &self.table.schema)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vecs.Collection(name=\"{}\", dimension={})",
            self.name, self.dimension
        )
    }
}

impl Collection {
    pub(crate) fn new(
        table: TableRef,
        dimension: usize,
        adapter: Option<Adapter>,
        context: Arc<ClientContext>,
        index: Option<IndexDescriptor>,
    ) -> Self {
        let adapter = adapter.unwrap_or_else(|| Adapter::single(NoOp::new(dimension)));
        Self {
            name: table.name.clone(),
            dimension,
            table,
            adapter,
            context,
            index_state: Mutex::new(IndexState::from_descriptor(index)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.table.schema
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Number of records stored.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.context.backend.count(&self.table).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Insert or overwrite records by id
    ///
    /// Records run through the adapter pipeline unless `skip_adapter` is set,
    /// in which case each must already carry a vector of the collection's
    /// dimension. Batches are written as independent transactions; a failure
    /// leaves earlier batches committed.
    pub async fn upsert<I>(&self, records: I, skip_adapter: bool) -> Result<()>
    where
        I: IntoIterator<Item = MediaRecord>,
        I::IntoIter: Send,
    {
        let batch_size = self.context.config.upsert_batch_size;
        let input = record_stream(records);
        let mut pipeline = if skip_adapter {
            input.map_ok(AdaptedRecord::from).boxed()
        } else {
            self.adapter.apply(input, AdapterContext::Upsert)
        };

        let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
        let mut written = 0usize;
        while let Some(adapted) = pipeline.try_next().await? {
            batch.push(adapted.into_record(self.dimension)?);
            if batch.len() >= batch_size {
                written += self.write_batch(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            written += self.write_batch(batch).await?;
        }

        debug!("Upserted {} records into {}", written, self.table);
        Ok(())
    }

    async fn write_batch(&self, batch: Vec<Record>) -> Result<usize> {
        let unique = dedupe_last_wins(batch);
        self.context.backend.upsert(&self.table, &unique).await?;
        Ok(unique.len())
    }

    /// Fetch records by id; unknown ids are omitted from the result.
    ///
    /// A single id string is not a list of ids:
    ///
    /// ```compile_fail
    /// # async fn f(docs: &vecs::Collection) -> vecs::Result<()> {
    /// docs.fetch("id-1").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Record>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.context.config.fetch_batch_size) {
            records.extend(self.context.backend.fetch(&self.table, chunk).await?);
        }
        Ok(records)
    }

    /// Fetch a single record.
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        let mut records = self.fetch(std::slice::from_ref(&id)).await?;
        Ok(records.pop())
    }

    /// Delete by ids or by a filter expression, returning the deleted ids.
    ///
    /// Exactly one of `ids` and `filters` must be given.
    pub async fn delete(
        &self,
        ids: Option<&[String]>,
        filters: Option<&JsonValue>,
    ) -> Result<Vec<String>> {
        match (ids, filters) {
            (Some(ids), None) => self.delete_ids(ids).await,
            (None, Some(filters)) => self.delete_where(filters).await,
            (Some(_), Some(_)) => Err(VecsError::arg(
                "Either ids or filters must be provided, not both.",
            )),
            (None, None) => Err(VecsError::arg("Either ids or filters must be provided.")),
        }
    }

    pub async fn delete_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<String>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let mut deleted = Vec::new();
        for chunk in ids.chunks(self.context.config.delete_batch_size) {
            deleted.extend(self.context.backend.delete_ids(&self.table, chunk).await?);
        }
        Ok(deleted)
    }

    pub async fn delete_where(&self, filters: &JsonValue) -> Result<Vec<String>> {
        let predicate = Predicate::compile(filters)?;
        Ok(self
            .context
            .backend
            .delete_matching(&self.table, &predicate)
            .await?)
    }

    /// Nearest-neighbour search
    ///
    /// `data` goes through the adapter pipeline (unless skipped) and must come
    /// out as exactly one vector. Every argument is validated before the
    /// database is contacted.
    pub async fn query(
        &self,
        data: impl Into<Media>,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        options.validate()?;

        let caps = self.context.capabilities;
        if !caps.supports_measure(options.measure) {
            return Err(VecsError::arg(format!(
                "{} requires a newer vector extension than {}",
                options.measure, caps.version
            )));
        }

        let predicate = options
            .filters
            .as_ref()
            .map(Predicate::compile)
            .transpose()?;

        let input = MediaRecord::new("", data, None);
        let adapted = if options.skip_adapter {
            AdaptedRecord::from(input)
        } else {
            self.adapter.adapt_query(input).await?
        };
        let query_vector = adapted.into_record(self.dimension)?.vector;

        match self.index_coverage(options.measure).await? {
            IndexCoverage::Covered => {}
            IndexCoverage::Unindexed => warn!(
                "Query does not have a covering index for {}. See Collection::create_index",
                options.measure
            ),
            IndexCoverage::MeasureMismatch { indexed } => warn!(
                "Query measure {} does not match the index measure {} on {}",
                options.measure, indexed, self.table
            ),
        }

        let request = SearchRequest {
            vector: query_vector,
            measure: options.measure,
            limit: options.limit,
            predicate,
            include_value: options.include_value,
            include_metadata: options.include_metadata,
            include_vector: options.include_vector,
            probes: options.probes.unwrap_or(DEFAULT_PROBES),
            ef_search: caps
                .supports_hnsw()
                .then(|| options.ef_search.unwrap_or(DEFAULT_EF_SEARCH)),
        };

        let rows = self.context.backend.search(&self.table, &request).await?;
        if options.projects_rows() {
            Ok(QueryResult::Rows(rows.into_iter().map(QueryRow::from).collect()))
        } else {
            Ok(QueryResult::Ids(rows.into_iter().map(|r| r.id).collect()))
        }
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.index_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload the persisted descriptor unless a build is in flight.
    ///
    /// The backend read happens without the state lock; a build started by
    /// this handle in the meantime keeps its `Building` state.
    async fn refresh_index(&self) -> Result<()> {
        if self.state().is_building() {
            return Ok(());
        }
        let descriptor = self.context.backend.index_descriptor(&self.table).await?;
        let mut state = self.state();
        if !state.is_building() {
            *state = IndexState::from_descriptor(descriptor);
        }
        Ok(())
    }

    /// The active index, if any. During a rebuild this is the index being replaced.
    pub async fn index(&self) -> Result<Option<IndexDescriptor>> {
        self.refresh_index().await?;
        Ok(self.state().current().cloned())
    }

    pub async fn index_coverage(&self, measure: IndexMeasure) -> Result<IndexCoverage> {
        self.refresh_index().await?;
        Ok(self.state().coverage(measure))
    }

    /// Whether an index exists and was built for `measure`.
    pub async fn is_indexed_for_measure(&self, measure: IndexMeasure) -> Result<bool> {
        Ok(self.index_coverage(measure).await?.is_covered())
    }

    /// Build the collection's similarity index
    ///
    /// `IndexMethod::Auto` picks hnsw when the engine supports it and ivfflat
    /// otherwise. An existing index is replaced only when `request.replace`
    /// is set. The build blocks until the index is ready; queries on this
    /// handle keep being served by the previous index meanwhile.
    pub async fn create_index(&self, request: IndexRequest) -> Result<IndexDescriptor> {
        let caps = self.context.capabilities;
        let method = resolve_method(request.method, request.args.as_ref(), &caps)?;

        let n_records = if method == IndexMethod::IvfFlat && request.args.is_none() {
            self.len().await?
        } else {
            0
        };
        let next = plan_index(&request, &caps, n_records)?;

        self.refresh_index().await?;
        let previous = {
            let mut state = self.state();
            state.begin_build(next.clone(), request.replace)?;
            match &*state {
                IndexState::Building { previous, .. } => previous.clone(),
                _ => None,
            }
        };
        let build = BuildGuard::new(&self.index_state);

        self.context
            .backend
            .replace_index(&self.table, previous.as_ref(), &next)
            .await?;

        build.finish();
        info!(
            "Index {} ({} {}) ready on {}",
            next.name,
            next.method(),
            next.measure,
            self.table
        );
        Ok(next)
    }

    /// Drop the active index, returning it.
    pub async fn drop_index(&self) -> Result<Option<IndexDescriptor>> {
        self.refresh_index().await?;

        let dropped = {
            let mut state = self.state();
            if state.is_building() {
                return Err(VecsError::arg("an index build is already in progress"));
            }
            state.drop_index()
        };
        if let Some(descriptor) = &dropped {
            if let Err(e) = self
                .context
                .backend
                .drop_index(&self.table, descriptor)
                .await
            {
                *self.state() = IndexState::Ready(descriptor.clone());
                return Err(e.into());
            }
            info!("Dropped index {} on {}", descriptor.name, self.table);
        }
        Ok(dropped)
    }
}

/// Rolls an unfinished build back to its previous state when dropped,
/// including when the `create_index` future is cancelled mid-build.
struct BuildGuard<'a> {
    state: &'a Mutex<IndexState>,
    armed: bool,
}

impl<'a> BuildGuard<'a> {
    fn new(state: &'a Mutex<IndexState>) -> Self {
        Self { state, armed: true }
    }

    fn finish(mut self) {
        self.armed = false;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish_build();
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Index build did not complete, restoring previous index state");
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .abort_build();
        }
    }
}
