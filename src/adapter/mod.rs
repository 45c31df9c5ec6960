// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Adapter pipelines
//!
//! An [`Adapter`] turns caller media (text, literal vectors) into records a
//! collection can store. Steps are chained lazily, so an upsert never holds
//! more than one batch of adapted records at a time.

pub mod base;
pub mod embedder;
pub mod markdown;
pub mod noop;
pub mod text;

pub use base::{record_stream, Adapter, AdapterContext, AdapterStep, RecordStream};
pub use embedder::{Embedder, EmbedderError, HttpEmbedder};
pub use markdown::MarkdownChunker;
pub use noop::NoOp;
pub use text::{ParagraphChunker, TextEmbedding, TextEmbeddingModel};
