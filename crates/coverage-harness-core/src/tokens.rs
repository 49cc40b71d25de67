//! Token counting.
//!
//! Chunk budgets are measured with the `cl100k_base` byte-pair encoding via
//! `tiktoken-rs`. The [`TokenCounter`] trait lets callers substitute a
//! cheaper counter where exact BPE counts are not needed.

use anyhow::Result;
use tiktoken_rs::CoreBPE;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `cl100k_base` token counter.
///
/// Loading the encoding is not free, so construct one at startup and pass
/// it to the segmenter by reference.
pub struct Cl100kCounter {
    bpe: CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Counts whitespace-separated words. Deterministic and dependency-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
