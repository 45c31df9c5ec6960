// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;

use crate::core::error::{Result, VecsError};
use crate::core::types::{AdaptedRecord, MediaRecord};

/// Lazy sequence of records flowing through a pipeline.
pub type RecordStream<'a, T> = BoxStream<'a, Result<T>>;

/// Operation a pipeline is run for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterContext {
    Upsert,
    Query,
}

impl fmt::Display for AdapterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterContext::Upsert => f.write_str("upsert"),
            AdapterContext::Query => f.write_str("query"),
        }
    }
}

/// One transformation in a pipeline
///
/// A step consumes records whose metadata may be absent and produces records
/// with metadata always present. It may fan one input out into several
/// outputs, but must not reorder them.
pub trait AdapterStep: Send + Sync {
    /// Length of the vectors this step emits, if it emits vectors.
    fn exported_dimension(&self) -> Option<usize> {
        None
    }

    fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord>;
}

/// Ordered, non-empty chain of adapter steps
#[derive(Clone)]
pub struct Adapter {
    steps: Vec<Arc<dyn AdapterStep>>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("steps", &self.steps.len())
            .field("exported_dimension", &self.exported_dimension())
            .finish()
    }
}

impl Adapter {
    pub fn new(steps: Vec<Arc<dyn AdapterStep>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(VecsError::arg("Adapter must contain at least 1 step"));
        }
        Ok(Self { steps })
    }

    /// Convenience for a single-step pipeline.
    pub fn single(step: impl AdapterStep + 'static) -> Self {
        Self {
            steps: vec![Arc::new(step)],
        }
    }

    pub fn steps(&self) -> &[Arc<dyn AdapterStep>] {
        &self.steps
    }

    /// Dimension declared by the last step that declares one.
    pub fn exported_dimension(&self) -> Option<usize> {
        self.steps.iter().rev().find_map(|s| s.exported_dimension())
    }

    /// Chain every step over `records` without materializing between stages.
    pub fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord> {
        let mut steps = self.steps.iter();
        let first = match steps.next() {
            Some(step) => step.apply(records, context),
            None => return records.map_ok(AdaptedRecord::from).boxed(),
        };

        steps.fold(first, |pipeline, step| {
            step.apply(pipeline.map_ok(MediaRecord::from).boxed(), context)
        })
    }

    /// Run exactly one record through the pipeline for a query.
    ///
    /// Steps that fan out (or drop) the record make the query ambiguous and
    /// are reported as an argument error.
    pub async fn adapt_query(&self, record: MediaRecord) -> Result<AdaptedRecord> {
        let input = stream::iter(vec![Ok(record)]).boxed();
        let mut outputs: Vec<AdaptedRecord> = self
            .apply(input, AdapterContext::Query)
            .try_collect()
            .await?;

        match outputs.len() {
            1 => Ok(outputs.remove(0)),
            n => Err(VecsError::arg(format!(
                "Adapter must produce exactly 1 record for a query, produced {}",
                n
            ))),
        }
    }
}

/// Lift an iterator of records into a pipeline input.
pub fn record_stream<'a, I>(records: I) -> RecordStream<'a, MediaRecord>
where
    I: IntoIterator<Item = MediaRecord>,
    I::IntoIter: Send + 'a,
{
    stream::iter(records.into_iter().map(Ok)).boxed()
}
