//! SQLite-backed [`Store`] implementation.
//!
//! Chunk text and provenance live in `chunks`; vectors live in
//! `chunk_vectors` as little-endian `f32` BLOBs. Queries load every vector
//! and rank by cosine similarity in process, which is adequate for the
//! few thousand chunks a policy library produces.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use coverage_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use coverage_harness_core::models::{ChunkMetadata, RetrievedHit};
use coverage_harness_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    model: String,
}

impl SqliteStore {
    /// `model` tags every vector written through this store.
    pub fn new(pool: SqlitePool, model: impl Into<String>) -> Self {
        Self {
            pool,
            model: model.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Chunk counts per source file, sorted by filename.
    pub async fn document_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT filename, COUNT(*) AS n FROM chunks GROUP BY filename ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("filename"), row.get("n")))
            .collect())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let blob = vec_to_blob(embedding);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, filename, page_number, page_end, section_title,
                                token_count, char_start, char_end, text)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                page_number = excluded.page_number,
                page_end = excluded.page_end,
                section_title = excluded.section_title,
                token_count = excluded.token_count,
                char_start = excluded.char_start,
                char_end = excluded.char_end,
                text = excluded.text
            "#,
        )
        .bind(id)
        .bind(&metadata.filename)
        .bind(metadata.page_number as i64)
        .bind(metadata.page_end as i64)
        .bind(&metadata.section_title)
        .bind(metadata.token_count as i64)
        .bind(metadata.char_start as i64)
        .bind(metadata.char_end as i64)
        .bind(text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, model, dims, embedding, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(id)
        .bind(&self.model)
        .bind(embedding.len() as i64)
        .bind(&blob)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedHit>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.filename, c.page_number, c.page_end, c.section_title,
                   c.token_count, c.char_start, c.char_end, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<RetrievedHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                RetrievedHit {
                    chunk_id: row.get("id"),
                    text: row.get("text"),
                    score: cosine_similarity(embedding, &vec) as f64,
                    metadata: ChunkMetadata {
                        filename: row.get("filename"),
                        page_number: row.get::<i64, _>("page_number") as u32,
                        page_end: row.get::<i64, _>("page_end") as u32,
                        section_title: row.get("section_title"),
                        token_count: row.get::<i64, _>("token_count") as usize,
                        char_start: row.get::<i64, _>("char_start") as usize,
                        char_end: row.get::<i64, _>("char_end") as usize,
                    },
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
