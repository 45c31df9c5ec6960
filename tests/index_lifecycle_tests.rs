// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

// Index builds running concurrently with reads on the same collection handle,
// and the warnings queries emit about index coverage

use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use vecs::core::metadata_filter::Predicate;
use vecs::index::{IndexDescriptor, IndexMeasure, IndexMethod, IndexRequest};
use vecs::storage::{ExtensionVersion, SearchRequest, SearchRow, TableRef};
use vecs::{
    Backend, BackendError, Client, ClientConfig, Collection, MediaRecord, MemoryBackend,
    QueryOptions, Record, VecsError,
};

/// Memory backend whose `replace_index` needs a permit on `gate`. A build that
/// finds none signals `entered` and waits.
struct GatedIndexBackend {
    inner: MemoryBackend,
    entered: Notify,
    gate: Semaphore,
}

impl GatedIndexBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Let the next `n` index builds through.
    fn allow_builds(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl Backend for GatedIndexBackend {
    async fn extension_version(&self) -> Result<ExtensionVersion, BackendError> {
        self.inner.extension_version().await
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), BackendError> {
        self.inner.ensure_schema(schema).await
    }

    async fn collection_dimension(&self, table: &TableRef) -> Result<Option<usize>, BackendError> {
        self.inner.collection_dimension(table).await
    }

    async fn list_collections(&self, schema: &str) -> Result<Vec<String>, BackendError> {
        self.inner.list_collections(schema).await
    }

    async fn create_collection(
        &self,
        table: &TableRef,
        dimension: usize,
    ) -> Result<(), BackendError> {
        self.inner.create_collection(table, dimension).await
    }

    async fn drop_collection(&self, table: &TableRef) -> Result<(), BackendError> {
        self.inner.drop_collection(table).await
    }

    async fn count(&self, table: &TableRef) -> Result<usize, BackendError> {
        self.inner.count(table).await
    }

    async fn upsert(&self, table: &TableRef, records: &[Record]) -> Result<(), BackendError> {
        self.inner.upsert(table, records).await
    }

    async fn fetch(&self, table: &TableRef, ids: &[String]) -> Result<Vec<Record>, BackendError> {
        self.inner.fetch(table, ids).await
    }

    async fn delete_ids(
        &self,
        table: &TableRef,
        ids: &[String],
    ) -> Result<Vec<String>, BackendError> {
        self.inner.delete_ids(table, ids).await
    }

    async fn delete_matching(
        &self,
        table: &TableRef,
        predicate: &Predicate,
    ) -> Result<Vec<String>, BackendError> {
        self.inner.delete_matching(table, predicate).await
    }

    async fn search(
        &self,
        table: &TableRef,
        request: &SearchRequest,
    ) -> Result<Vec<SearchRow>, BackendError> {
        self.inner.search(table, request).await
    }

    async fn index_descriptor(
        &self,
        table: &TableRef,
    ) -> Result<Option<IndexDescriptor>, BackendError> {
        self.inner.index_descriptor(table).await
    }

    async fn replace_index(
        &self,
        table: &TableRef,
        previous: Option<&IndexDescriptor>,
        next: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        match self.gate.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_) => {
                self.entered.notify_one();
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
            }
        }
        self.inner.replace_index(table, previous, next).await
    }

    async fn drop_index(
        &self,
        table: &TableRef,
        descriptor: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        self.inner.drop_index(table, descriptor).await
    }
}

async fn gated_collection() -> (Arc<GatedIndexBackend>, Client, Collection) {
    let backend = Arc::new(GatedIndexBackend::new());
    let client = Client::with_backend(backend.clone(), ClientConfig::default())
        .await
        .unwrap();
    let docs = client.create_collection("docs", 3).await.unwrap();
    let records: Vec<MediaRecord> = (0..10)
        .map(|i| {
            MediaRecord::vector(
                format!("r{}", i),
                vec![1.0, i as f32, 0.5],
                Default::default(),
            )
        })
        .collect();
    docs.upsert(records, false).await.unwrap();
    (backend, client, docs)
}

fn hnsw(measure: IndexMeasure) -> IndexRequest {
    IndexRequest::new()
        .method(IndexMethod::Hnsw)
        .measure(measure)
}

const NOT_BLOCKED: Duration = Duration::from_secs(5);

#[cfg(test)]
mod concurrent_build_tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_served_by_previous_index_during_rebuild() {
        let (backend, _client, docs) = gated_collection().await;
        backend.allow_builds(1);
        let cosine = docs
            .create_index(hnsw(IndexMeasure::CosineDistance))
            .await
            .unwrap();

        let rebuild = docs.create_index(hnsw(IndexMeasure::L2Distance));
        let reads = async {
            backend.entered.notified().await;

            let hits = timeout(
                NOT_BLOCKED,
                docs.query(vec![1.0f32, 0.0, 0.5], &QueryOptions::new().limit(1)),
            )
            .await
            .expect("query waited for the index build")
            .unwrap();
            assert_eq!(hits.ids(), vec!["r0"]);

            let current = timeout(NOT_BLOCKED, docs.index())
                .await
                .expect("index() waited for the index build")
                .unwrap();
            assert_eq!(current.as_ref(), Some(&cosine));
            assert!(docs
                .is_indexed_for_measure(IndexMeasure::CosineDistance)
                .await
                .unwrap());

            let second = docs.create_index(hnsw(IndexMeasure::MaxInnerProduct)).await;
            assert!(matches!(second, Err(VecsError::Arg(_))));
            let dropped = docs.drop_index().await;
            assert!(matches!(dropped, Err(VecsError::Arg(_))));

            backend.allow_builds(1);
        };

        let (rebuilt, ()) = tokio::join!(rebuild, reads);
        let rebuilt = rebuilt.unwrap();
        assert_eq!(docs.index().await.unwrap(), Some(rebuilt));
        assert!(docs
            .is_indexed_for_measure(IndexMeasure::L2Distance)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_build_restores_previous_index() {
        let (backend, _client, docs) = gated_collection().await;
        backend.allow_builds(1);
        let cosine = docs
            .create_index(hnsw(IndexMeasure::CosineDistance))
            .await
            .unwrap();

        tokio::select! {
            _ = docs.create_index(hnsw(IndexMeasure::L2Distance)) => {
                panic!("build finished without a permit")
            }
            _ = backend.entered.notified() => {}
        }

        assert_eq!(docs.index().await.unwrap(), Some(cosine));

        backend.allow_builds(1);
        let l2 = docs
            .create_index(hnsw(IndexMeasure::L2Distance))
            .await
            .unwrap();
        assert_eq!(docs.index().await.unwrap(), Some(l2));
    }

    #[tokio::test]
    async fn test_timed_out_first_build_leaves_no_index() {
        let (backend, _client, docs) = gated_collection().await;

        let attempt = timeout(
            Duration::from_millis(50),
            docs.create_index(IndexRequest::new()),
        )
        .await;
        assert!(attempt.is_err());
        assert!(docs.index().await.unwrap().is_none());

        backend.allow_builds(1);
        assert!(docs.create_index(IndexRequest::new()).await.is_ok());
    }
}

/// Records the message of every WARN event.
#[derive(Clone, Default)]
struct WarnCapture(Arc<Mutex<Vec<String>>>);

impl WarnCapture {
    fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for WarnCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.0.lock().unwrap().push(visitor.0);
        }
    }
}

#[cfg(test)]
mod coverage_warning_tests {
    use super::*;

    async fn plain_collection() -> (Client, Collection) {
        let client = Client::with_backend(Arc::new(MemoryBackend::new()), ClientConfig::default())
            .await
            .unwrap();
        let docs = client.create_collection("docs", 2).await.unwrap();
        docs.upsert(
            vec![
                MediaRecord::vector("a", vec![1.0, 0.0], Default::default()),
                MediaRecord::vector("b", vec![0.0, 1.0], Default::default()),
            ],
            false,
        )
        .await
        .unwrap();
        (client, docs)
    }

    #[tokio::test]
    async fn test_query_without_index_warns() {
        let capture = WarnCapture::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let (_client, docs) = plain_collection().await;
        docs.query(vec![1.0f32, 0.0], &QueryOptions::new())
            .await
            .unwrap();

        let warnings = capture.messages();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("does not have a covering index"));
    }

    #[tokio::test]
    async fn test_query_with_other_measure_warns() {
        let capture = WarnCapture::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let (_client, docs) = plain_collection().await;
        docs.create_index(hnsw(IndexMeasure::CosineDistance))
            .await
            .unwrap();

        docs.query(vec![1.0f32, 0.0], &QueryOptions::new())
            .await
            .unwrap();
        assert!(capture.messages().is_empty());

        docs.query(
            vec![1.0f32, 0.0],
            &QueryOptions::new().measure(IndexMeasure::L2Distance),
        )
        .await
        .unwrap();
        let warnings = capture.messages();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("does not match the index measure"));
        assert!(warnings[0].contains(&IndexMeasure::CosineDistance.to_string()));
    }

    #[tokio::test]
    async fn test_filtered_query_without_index_warns_once() {
        let capture = WarnCapture::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let (_client, docs) = plain_collection().await;
        let filtered = docs
            .query(
                vec![0.0f32, 1.0],
                &QueryOptions::new().filters(json!({"missing": {"$eq": 1}})),
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());
        assert_eq!(capture.messages().len(), 1);
    }
}
