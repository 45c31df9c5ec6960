// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Heading-aware markdown chunking
//!
//! A heading (`#` through `######` followed by a space, or a line underlined
//! with `=` or `-`) starts a new chunk. With a token budget, a chunk is also
//! closed before it would exceed the budget, and lines longer than the budget
//! are cut, preferably just after a full stop, otherwise at a word boundary.
//! Tokens are whitespace separated words.

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::adapter::base::{AdapterContext, AdapterStep, RecordStream};
use crate::adapter::text::{chunk_id, text_of};
use crate::core::error::{Result, VecsError};
use crate::core::types::{AdaptedRecord, Media, MediaRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownChunker {
    pub skip_during_query: bool,
    max_tokens: Option<usize>,
}

impl MarkdownChunker {
    pub fn new(skip_during_query: bool) -> Self {
        Self {
            skip_during_query,
            max_tokens: None,
        }
    }

    /// Cap every emitted chunk at `max_tokens` words.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(VecsError::arg("max_tokens must be a nonzero positive integer"));
        }
        self.max_tokens = Some(max_tokens);
        Ok(self)
    }

    pub fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    /// Split `markdown` into chunks, dropping whitespace-only ones.
    pub fn split_by_heading(markdown: &str, max_tokens: Option<usize>) -> Vec<String> {
        let lines: Vec<&str> = markdown.split('\n').collect();
        let mut chunks: Vec<String> = Vec::new();
        let mut current = Chunk::default();

        for (i, raw_line) in lines.iter().enumerate() {
            let next_line = lines.get(i + 1).copied();
            let mut line = raw_line.to_string();

            if let Some(max) = max_tokens {
                while token_count(&line) > max {
                    current.flush_into(&mut chunks);
                    let (head, rest) = cut_line(&line, max);
                    chunks.push(head);
                    line = rest;
                }
            }

            let over_budget =
                max_tokens.map_or(false, |max| current.tokens + token_count(&line) > max);

            if is_heading(&line, next_line) || over_budget {
                current.flush_into(&mut chunks);
            }
            current.push_line(&line);
        }
        current.flush_into(&mut chunks);

        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn split(&self, record: MediaRecord) -> Result<Vec<AdaptedRecord>> {
        let metadata = record.metadata.clone().unwrap_or_default();
        let text = text_of(&record)?;
        Ok(Self::split_by_heading(text, self.max_tokens)
            .into_iter()
            .enumerate()
            .map(|(ix, chunk)| AdaptedRecord {
                id: chunk_id(&record.id, "head", ix),
                media: Media::Text(chunk),
                metadata: metadata.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
struct Chunk {
    lines: Vec<String>,
    tokens: usize,
}

impl Chunk {
    fn push_line(&mut self, line: &str) {
        self.tokens += token_count(line);
        self.lines.push(line.to_string());
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        if !self.lines.is_empty() {
            chunks.push(self.lines.join("\n"));
        }
        self.lines.clear();
        self.tokens = 0;
    }
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Cut the first at most `max` words off `line`.
fn cut_line(line: &str, max: usize) -> (String, String) {
    let words: Vec<&str> = line.split_whitespace().collect();
    let window = &words[..max.min(words.len())];

    let take = window
        .iter()
        .rposition(|w| w.ends_with('.'))
        .map(|ix| ix + 1)
        .unwrap_or(window.len());

    (words[..take].join(" "), words[take..].join(" "))
}

pub(crate) fn is_heading(line: &str, next_line: Option<&str>) -> bool {
    if line.trim().is_empty() {
        return false;
    }

    if line.starts_with('#') {
        let hashes = line.chars().take_while(|c| *c == '#').count();
        return hashes <= 6 && line[hashes..].starts_with(' ');
    }

    match next_line.and_then(|n| n.chars().next()) {
        Some(marker @ ('=' | '-')) => next_line.map_or(false, |n| n.chars().all(|c| c == marker)),
        _ => false,
    }
}

impl AdapterStep for MarkdownChunker {
    fn apply<'a>(
        &'a self,
        records: RecordStream<'a, MediaRecord>,
        context: AdapterContext,
    ) -> RecordStream<'a, AdaptedRecord> {
        if context == AdapterContext::Query && self.skip_during_query {
            return records.map_ok(AdaptedRecord::from).boxed();
        }

        records
            .and_then(move |record| async move { self.split(record) })
            .map_ok(|chunks| stream::iter(chunks.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_headings() {
        assert!(is_heading("# title", None));
        assert!(is_heading("###### six", None));
        assert!(!is_heading("####### seven", None));
        assert!(!is_heading("#nospace", None));
        assert!(!is_heading("#!## bang", None));
        assert!(!is_heading("#", None));
    }

    #[test]
    fn test_underlined_headings() {
        assert!(is_heading("Title", Some("=====")));
        assert!(is_heading("Title", Some("---")));
        assert!(!is_heading("Title", Some("-=-===")));
        assert!(!is_heading("Title", Some("")));
        assert!(!is_heading("   ", Some("===")));
    }

    #[test]
    fn test_cut_prefers_full_stop() {
        let (head, rest) = cut_line("one two. three four five six", 4);
        assert_eq!(head, "one two.");
        assert_eq!(rest, "three four five six");
    }

    #[test]
    fn test_cut_falls_back_to_words() {
        let (head, rest) = cut_line("a b c d e f", 4);
        assert_eq!(head, "a b c d");
        assert_eq!(rest, "e f");
    }

    #[test]
    fn test_budget_closes_chunk() {
        let chunks = MarkdownChunker::split_by_heading("a b c\nd e f\ng", Some(4));
        assert_eq!(chunks, vec!["a b c", "d e f\ng"]);
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(MarkdownChunker::new(true).with_max_tokens(0).is_err());
    }
}
