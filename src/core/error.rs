// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::adapter::embedder::EmbedderError;
use crate::core::metadata_filter::FilterError;
use crate::storage::BackendError;

/// Errors surfaced by client, collection and adapter operations.
///
/// Every variant except `Backend` and `Embedder` is raised before any
/// statement reaches the database.
#[derive(Error, Debug)]
pub enum VecsError {
    /// Structurally invalid arguments: limits, ids, conflicting flags.
    #[error("Invalid argument: {0}")]
    Arg(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Mismatched dimension: {0}")]
    MismatchedDimension(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Embedder(#[from] EmbedderError),
}

impl VecsError {
    pub(crate) fn arg(msg: impl Into<String>) -> Self {
        VecsError::Arg(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VecsError>;
