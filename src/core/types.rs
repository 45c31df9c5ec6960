// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{Result, VecsError};

/// Ordered key/value document attached to every record.
pub type Metadata = Map<String, Value>;

/// A stored vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

impl Record {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Raw input handed to an adapter pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Media {
    Vector(Vec<f32>),
    Text(String),
}

impl Media {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Media::Text(text) => Some(text),
            Media::Vector(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Media::Vector(_) => "vector",
            Media::Text(_) => "text",
        }
    }
}

impl From<Vec<f32>> for Media {
    fn from(vector: Vec<f32>) -> Self {
        Media::Vector(vector)
    }
}

impl From<&[f32]> for Media {
    fn from(vector: &[f32]) -> Self {
        Media::Vector(vector.to_vec())
    }
}

impl From<String> for Media {
    fn from(text: String) -> Self {
        Media::Text(text)
    }
}

impl From<&str> for Media {
    fn from(text: &str) -> Self {
        Media::Text(text.to_string())
    }
}

/// Pipeline input: metadata may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: String,
    pub media: Media,
    pub metadata: Option<Metadata>,
}

impl MediaRecord {
    pub fn new(id: impl Into<String>, media: impl Into<Media>, metadata: Option<Metadata>) -> Self {
        Self {
            id: id.into(),
            media: media.into(),
            metadata,
        }
    }

    /// Record carrying a literal vector.
    pub fn vector(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self::new(id, Media::Vector(vector), Some(metadata))
    }

    /// Record carrying text for an embedding pipeline.
    pub fn text(id: impl Into<String>, text: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self::new(id, Media::Text(text.into()), metadata)
    }
}

/// Pipeline output: metadata is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedRecord {
    pub id: String,
    pub media: Media,
    pub metadata: Metadata,
}

impl From<MediaRecord> for AdaptedRecord {
    fn from(record: MediaRecord) -> Self {
        Self {
            id: record.id,
            media: record.media,
            metadata: record.metadata.unwrap_or_default(),
        }
    }
}

impl From<AdaptedRecord> for MediaRecord {
    fn from(record: AdaptedRecord) -> Self {
        Self {
            id: record.id,
            media: record.media,
            metadata: Some(record.metadata),
        }
    }
}

impl AdaptedRecord {
    /// Turn a fully adapted record into a storable one.
    ///
    /// Fails when the pipeline did not end in a vector of `dimension` floats.
    pub fn into_record(self, dimension: usize) -> Result<Record> {
        match self.media {
            Media::Vector(vector) => {
                if vector.len() != dimension {
                    return Err(VecsError::arg(format!(
                        "vector for id '{}' has {} dimensions, collection expects {}",
                        self.id,
                        vector.len(),
                        dimension
                    )));
                }
                if vector.iter().any(|v| !v.is_finite()) {
                    return Err(VecsError::arg(format!(
                        "vector for id '{}' contains non-finite values",
                        self.id
                    )));
                }
                Ok(Record {
                    id: self.id,
                    vector,
                    metadata: self.metadata,
                })
            }
            other => Err(VecsError::arg(format!(
                "record '{}' reached storage as {} media; an adapter must produce a vector",
                self.id,
                other.kind()
            ))),
        }
    }
}
