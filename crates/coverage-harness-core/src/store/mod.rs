//! Vector store abstraction for Coverage Harness.
//!
//! The [`Store`] trait is the similarity-index collaborator used by
//! ingestion ([`upsert`](Store::upsert)) and by the retrieval engine
//! ([`query`](Store::query)). Backends: [`memory::InMemoryStore`] here,
//! and the SQLite store in the app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, ChunkMetadata, RetrievedHit};

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Insert or replace one chunk vector |
/// | [`query`](Store::query) | Top-`k` hits by cosine similarity |
/// | [`count`](Store::count) | Number of stored vectors |
/// | [`reset`](Store::reset) | Remove every stored vector |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> Result<()>;

    /// Return up to `k` hits ordered by descending similarity
    /// (`1 − cosine_distance`). An empty store returns an empty list.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedHit>>;

    async fn count(&self) -> Result<usize>;

    async fn reset(&self) -> Result<()>;
}

/// Upsert a batch of chunks with their vectors, pairing them by position.
pub async fn upsert_chunks(store: &dyn Store, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    for (chunk, vector) in chunks.iter().zip(vectors) {
        store
            .upsert(&chunk.chunk_id, &chunk.text, vector, &chunk.metadata())
            .await?;
    }
    Ok(())
}

/// Sort hits by descending score, breaking ties by chunk id.
pub(crate) fn rank_hits(hits: &mut [RetrievedHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}
