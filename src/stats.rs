//! Index statistics.
//!
//! Used by `cov stats` to confirm that ingestion produced chunks and
//! vectors for every document.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Per-document chunk and vector counts.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStats {
    pub filename: String,
    pub chunk_count: i64,
    pub embedded_count: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub total_chunks: i64,
    pub total_embedded: i64,
    pub models: Vec<String>,
    pub documents: Vec<DocumentStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(pool)
        .await?;
    let models: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT model FROM chunk_vectors ORDER BY model")
            .fetch_all(pool)
            .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            c.filename,
            COUNT(c.id) AS chunk_count,
            COUNT(cv.chunk_id) AS embedded_count,
            MAX(c.page_end) AS pages
        FROM chunks c
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        GROUP BY c.filename
        ORDER BY c.filename
        "#,
    )
    .fetch_all(pool)
    .await?;

    let documents = rows
        .iter()
        .map(|row| DocumentStats {
            filename: row.get("filename"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
            pages: row.get("pages"),
        })
        .collect();

    Ok(IndexStats {
        total_chunks,
        total_embedded,
        models,
        documents,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Coverage Harness Index Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents.len());
    println!("  Chunks:      {}", stats.total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.total_embedded,
        stats.total_chunks,
        if stats.total_chunks > 0 {
            (stats.total_embedded * 100) / stats.total_chunks
        } else {
            0
        }
    );
    if !stats.models.is_empty() {
        println!("  Models:      {}", stats.models.join(", "));
    }

    if !stats.documents.is_empty() {
        println!();
        println!("  By document:");
        println!(
            "  {:<40} {:>6} {:>8} {:>10}",
            "FILE", "PAGES", "CHUNKS", "EMBEDDED"
        );
        println!("  {}", "-".repeat(68));
        for d in &stats.documents {
            println!(
                "  {:<40} {:>6} {:>8} {:>10}",
                d.filename, d.pages, d.chunk_count, d.embedded_count
            );
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
