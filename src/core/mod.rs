// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod error;
pub mod jsonb;
pub mod metadata_filter;
pub mod types;
pub mod vector_ops;

pub use config::ClientConfig;
pub use error::{Result, VecsError};
pub use metadata_filter::{FilterError, Predicate};
pub use types::{AdaptedRecord, Media, MediaRecord, Metadata, Record};
