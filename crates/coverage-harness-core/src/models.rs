//! Core data models used throughout Coverage Harness.
//!
//! These types represent the extracted pages, detected section headers,
//! chunks, and retrieval hits that flow through the ingestion and
//! question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Text of a single extracted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub page_number: u32,
    pub text: String,
    /// Length of `text` in characters.
    pub char_count: usize,
    pub line_count: usize,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        let line_count = if text.is_empty() {
            0
        } else {
            text.matches('\n').count() + 1
        };
        Self {
            page_number,
            text,
            char_count,
            line_count,
        }
    }

    /// An empty page, used when a page's text cannot be recovered.
    pub fn empty(page_number: u32) -> Self {
        Self::new(page_number, String::new())
    }
}

/// A detected section header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMarker {
    /// Trimmed header text, at most 100 characters.
    pub title: String,
    pub page_number: u32,
    /// Zero-based line index within the page.
    pub line_offset: usize,
}

/// A token-bounded, sentence-aligned span of document text.
///
/// Serializes to the chunk interchange shape used by the JSON exports
/// and the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<stem>__chunk_<NNNN>`, 1-based and unique within a document.
    pub chunk_id: String,
    pub text: String,
    pub token_count: usize,
    pub filename: String,
    pub page_number: u32,
    pub page_end: u32,
    pub section_title: String,
    pub char_start: usize,
    pub char_end: usize,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            filename: self.filename.clone(),
            page_number: self.page_number,
            page_end: self.page_end,
            section_title: self.section_title.clone(),
            token_count: self.token_count,
            char_start: self.char_start,
            char_end: self.char_end,
        }
    }
}

/// Provenance stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub filename: String,
    pub page_number: u32,
    pub page_end: u32,
    pub section_title: String,
    pub token_count: usize,
    pub char_start: usize,
    pub char_end: usize,
}

impl ChunkMetadata {
    /// Whether `page` falls within this chunk's page range.
    pub fn spans_page(&self, page: u32) -> bool {
        self.page_number <= page && page <= self.page_end
    }
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedHit {
    pub chunk_id: String,
    pub text: String,
    /// Cosine similarity, higher is better.
    pub score: f64,
    pub metadata: ChunkMetadata,
}
