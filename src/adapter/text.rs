// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Text steps: paragraph chunking and embedding

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::adapter::base::{AdapterContext, AdapterStep, RecordStream};
use crate::adapter::embedder::{Embedder, EmbedderError, HttpEmbedder};
use crate::core::config::DEFAULT_EMBEDDING_BATCH_SIZE;
use crate::core::error::{Result, VecsError};
use crate::core::types::{AdaptedRecord, Media, MediaRecord};
use crate::core::vector_ops::normalize;

/// Id of the `index`-th piece cut from record `id`.
pub(crate) fn chunk_id(id: &str, kind: &str, index: usize) -> String {
    format!("{}_{}_{:03}", id, kind, index)
}

pub(crate) fn text_of(record: &MediaRecord) -> Result<&str> {
    record.media.as_text().ok_or_else(|| {
        VecsError::arg(format!(
            "record '{}' carries {} media where text is required",
            record.id,
            record.media.kind()
        ))
    })
}

/// Splits text on blank lines, one record per paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphChunker {
    pub skip_during_query: bool,
}

impl ParagraphChunker {
    pub fn new(skip_during_query: bool) -> Self {
        Self { skip_during_query }
    }

    fn split(record: MediaRecord) -> Result<Vec<AdaptedRecord>> {
        let metadata = record.metadata.clone().unwrap_or_default();
        let text = text_of(&record)?;
        Ok(text
            .split("\n\n")
            .enumerate()
            .map(|(ix, paragraph)| AdaptedRecord {
                id: chunk_id(&record.id, "para", ix),
                media: Media::Text(paragraph.to_string()),
                metadata: metadata.clone(),
            })
            .collect())
    }
}

impl AdapterStep for ParagraphChunker {
    fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord> {
        if context == AdapterContext::Query && self.skip_during_query {
            return records.map_ok(AdaptedRecord::from).boxed();
        }

        records
            .and_then(|record| async move { Self::split(record) })
            .map_ok(|chunks| stream::iter(chunks.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

/// Sentence-transformer models with known output dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEmbeddingModel {
    #[serde(rename = "all-mpnet-base-v2")]
    AllMpnetBaseV2,
    #[serde(rename = "multi-qa-mpnet-base-dot-v1")]
    MultiQaMpnetBaseDotV1,
    #[serde(rename = "all-distilroberta-v1")]
    AllDistilrobertaV1,
    #[serde(rename = "all-MiniLM-L12-v2")]
    AllMiniLmL12V2,
    #[serde(rename = "multi-qa-distilbert-cos-v1")]
    MultiQaDistilbertCosV1,
    #[serde(rename = "all-MiniLM-L6-v2")]
    AllMiniLmL6V2,
    #[serde(rename = "multi-qa-MiniLM-L6-cos-v1")]
    MultiQaMiniLmL6CosV1,
    #[serde(rename = "paraphrase-multilingual-mpnet-base-v2")]
    ParaphraseMultilingualMpnetBaseV2,
    #[serde(rename = "paraphrase-albert-small-v2")]
    ParaphraseAlbertSmallV2,
    #[serde(rename = "paraphrase-multilingual-MiniLM-L12-v2")]
    ParaphraseMultilingualMiniLmL12V2,
    #[serde(rename = "paraphrase-MiniLM-L3-v2")]
    ParaphraseMiniLmL3V2,
    #[serde(rename = "distiluse-base-multilingual-cased-v1")]
    DistiluseBaseMultilingualCasedV1,
    #[serde(rename = "distiluse-base-multilingual-cased-v2")]
    DistiluseBaseMultilingualCasedV2,
}

impl TextEmbeddingModel {
    pub const ALL: [TextEmbeddingModel; 13] = [
        TextEmbeddingModel::AllMpnetBaseV2,
        TextEmbeddingModel::MultiQaMpnetBaseDotV1,
        TextEmbeddingModel::AllDistilrobertaV1,
        TextEmbeddingModel::AllMiniLmL12V2,
        TextEmbeddingModel::MultiQaDistilbertCosV1,
        TextEmbeddingModel::AllMiniLmL6V2,
        TextEmbeddingModel::MultiQaMiniLmL6CosV1,
        TextEmbeddingModel::ParaphraseMultilingualMpnetBaseV2,
        TextEmbeddingModel::ParaphraseAlbertSmallV2,
        TextEmbeddingModel::ParaphraseMultilingualMiniLmL12V2,
        TextEmbeddingModel::ParaphraseMiniLmL3V2,
        TextEmbeddingModel::DistiluseBaseMultilingualCasedV1,
        TextEmbeddingModel::DistiluseBaseMultilingualCasedV2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEmbeddingModel::AllMpnetBaseV2 => "all-mpnet-base-v2",
            TextEmbeddingModel::MultiQaMpnetBaseDotV1 => "multi-qa-mpnet-base-dot-v1",
            TextEmbeddingModel::AllDistilrobertaV1 => "all-distilroberta-v1",
            TextEmbeddingModel::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            TextEmbeddingModel::MultiQaDistilbertCosV1 => "multi-qa-distilbert-cos-v1",
            TextEmbeddingModel::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            TextEmbeddingModel::MultiQaMiniLmL6CosV1 => "multi-qa-MiniLM-L6-cos-v1",
            TextEmbeddingModel::ParaphraseMultilingualMpnetBaseV2 => {
                "paraphrase-multilingual-mpnet-base-v2"
            }
            TextEmbeddingModel::ParaphraseAlbertSmallV2 => "paraphrase-albert-small-v2",
            TextEmbeddingModel::ParaphraseMultilingualMiniLmL12V2 => {
                "paraphrase-multilingual-MiniLM-L12-v2"
            }
            TextEmbeddingModel::ParaphraseMiniLmL3V2 => "paraphrase-MiniLM-L3-v2",
            TextEmbeddingModel::DistiluseBaseMultilingualCasedV1 => {
                "distiluse-base-multilingual-cased-v1"
            }
            TextEmbeddingModel::DistiluseBaseMultilingualCasedV2 => {
                "distiluse-base-multilingual-cased-v2"
            }
        }
    }

    /// Length of the sentence embedding the model produces.
    pub fn dimension(&self) -> usize {
        match self {
            TextEmbeddingModel::AllMiniLmL12V2
            | TextEmbeddingModel::AllMiniLmL6V2
            | TextEmbeddingModel::MultiQaMiniLmL6CosV1
            | TextEmbeddingModel::ParaphraseMultilingualMiniLmL12V2
            | TextEmbeddingModel::ParaphraseMiniLmL3V2 => 384,
            TextEmbeddingModel::DistiluseBaseMultilingualCasedV1
            | TextEmbeddingModel::DistiluseBaseMultilingualCasedV2 => 512,
            _ => 768,
        }
    }
}

impl fmt::Display for TextEmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEmbeddingModel {
    type Err = VecsError;

    fn from_str(s: &str) -> Result<Self> {
        TextEmbeddingModel::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| VecsError::arg(format!("Unknown text embedding model: {}", s)))
    }
}

/// Embeds text media into unit-length vectors, a batch at a time.
#[derive(Clone)]
pub struct TextEmbedding {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl fmt::Debug for TextEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEmbedding")
            .field("dimension", &self.embedder.dimension())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl TextEmbedding {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Embed with `model` served at `VECS_EMBEDDING_URL`.
    ///
    /// `VECS_EMBEDDING_API_KEY`, when set, is sent as a bearer token.
    pub fn from_env(model: TextEmbeddingModel) -> Result<Self> {
        let url = env::var("VECS_EMBEDDING_URL").map_err(|_| {
            VecsError::MissingDependency(
                "Missing text embedding endpoint. Hint: set VECS_EMBEDDING_URL".to_string(),
            )
        })?;

        let mut embedder = HttpEmbedder::new(url, model.as_str(), model.dimension())?;
        if let Ok(key) = env::var("VECS_EMBEDDING_API_KEY") {
            embedder = embedder.with_api_key(key);
        }
        Ok(Self::new(Arc::new(embedder)))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(VecsError::arg("batch_size must be >= 1"));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, batch: Vec<Result<MediaRecord>>) -> Result<Vec<AdaptedRecord>> {
        let records: Vec<MediaRecord> = batch.into_iter().collect::<Result<_>>()?;
        let texts = records
            .iter()
            .map(|r| text_of(r).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        debug!("Embedding batch of {} texts", texts.len());
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            return Err(EmbedderError::Response(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                records.len()
            ))
            .into());
        }

        Ok(records
            .into_iter()
            .zip(vectors)
            .map(|(record, mut vector)| {
                normalize(&mut vector);
                AdaptedRecord {
                    id: record.id,
                    media: Media::Vector(vector),
                    metadata: record.metadata.unwrap_or_default(),
                }
            })
            .collect())
    }
}

impl AdapterStep for TextEmbedding {
    fn exported_dimension(&self) -> Option<usize> {
        Some(self.embedder.dimension())
    }

    fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        _context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord> {
        records
            .chunks(self.batch_size)
            .then(move |batch| self.embed_batch(batch))
            .map_ok(|embedded| stream::iter(embedded.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
