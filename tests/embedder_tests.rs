// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

// HTTP embedding provider against a mocked endpoint

use futures::stream::TryStreamExt;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

use vecs::adapter::{
    record_stream, Adapter, AdapterContext, Embedder, EmbedderError, HttpEmbedder, TextEmbedding,
};
use vecs::core::types::{Media, MediaRecord};
use vecs::VecsError;

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_embed_sends_model_and_input() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/embeddings")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::Json(json!({
            "model": "all-MiniLM-L6-v2",
            "input": ["a", "b"]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    {"index": 0, "embedding": [1.0, 0.0, 0.0]},
                    {"index": 1, "embedding": [0.0, 1.0, 0.0]}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "all-MiniLM-L6-v2", 3)
        .unwrap()
        .with_api_key("secret");
    let vectors = embedder.embed(&texts(&["a", "b"])).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_response_order_follows_index() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 2.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(format!("{}/", server.url()), "m", 2).unwrap();
    let vectors = embedder.embed(&texts(&["first", "second"])).await.unwrap();
    assert_eq!(vectors[0], vec![1.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 2.0]);
}

#[tokio::test]
async fn test_error_status_surfaces_body() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    match embedder.embed(&texts(&["x"])).await {
        Err(EmbedderError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_dimension_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"index": 0, "embedding": [1.0]}]}).to_string())
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    assert!(matches!(
        embedder.embed(&texts(&["x"])).await,
        Err(EmbedderError::Response(_))
    ));
}

#[tokio::test]
async fn test_missing_embeddings_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"index": 0, "embedding": [1.0, 0.0]}]}).to_string())
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    assert!(matches!(
        embedder.embed(&texts(&["x", "y"])).await,
        Err(EmbedderError::Response(_))
    ));
}

#[tokio::test]
async fn test_empty_input_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/embeddings")
        .expect(0)
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    assert!(embedder.embed(&[]).await.unwrap().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_pipeline_failure_is_embedder_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(500)
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    let adapter = Adapter::single(TextEmbedding::new(Arc::new(embedder)));
    let result: Result<Vec<_>, _> = adapter
        .apply(
            record_stream(vec![MediaRecord::text("1", "hello", None)]),
            AdapterContext::Upsert,
        )
        .try_collect()
        .await;
    assert!(matches!(result, Err(VecsError::Embedder(_))));
}

#[tokio::test]
async fn test_pipeline_normalizes_http_vectors() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"index": 0, "embedding": [3.0, 4.0]}]}).to_string())
        .create_async()
        .await;

    let embedder = HttpEmbedder::new(server.url(), "m", 2).unwrap();
    let adapter = Adapter::single(TextEmbedding::new(Arc::new(embedder)));
    let out = adapter
        .adapt_query(MediaRecord::text("", "hello", None))
        .await
        .unwrap();
    assert_eq!(out.media, Media::Vector(vec![0.6, 0.8]));
}
