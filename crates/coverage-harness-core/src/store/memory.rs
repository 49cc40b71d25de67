//! In-memory [`Store`] implementation for tests and small corpora.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Queries are brute-force
//! cosine similarity over every stored vector.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, RetrievedHit};

use super::{rank_hits, Store};

struct StoredVector {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

/// In-memory vector store.
pub struct InMemoryStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        vectors.retain(|sv| sv.id != id);
        vectors.push(StoredVector {
            id: id.to_string(),
            text: text.to_string(),
            vector: embedding.to_vec(),
            metadata: metadata.clone(),
        });
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedHit>> {
        let vectors = self.vectors.read().map_err(poisoned)?;
        let mut hits: Vec<RetrievedHit> = vectors
            .iter()
            .map(|sv| RetrievedHit {
                chunk_id: sv.id.clone(),
                text: sv.text.clone(),
                score: cosine_similarity(embedding, &sv.vector) as f64,
                metadata: sv.metadata.clone(),
            })
            .collect();
        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.vectors.read().map_err(poisoned)?.len())
    }

    async fn reset(&self) -> Result<()> {
        self.vectors.write().map_err(poisoned)?.clear();
        Ok(())
    }
}
