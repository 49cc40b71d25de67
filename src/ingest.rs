//! Ingestion pipeline orchestration.
//!
//! ```text
//! input_dir/*.pdf|*.txt ─▶ extract_pages ─▶ segment_document ─▶ JSON exports
//!                                                   │
//!                             Store::upsert ◀── embed (batched)
//! ```
//!
//! A document that fails to extract is recorded in the parse summary and
//! skipped; the rest of the batch continues.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use coverage_harness_core::chunk::{segment_document, ChunkOptions};
use coverage_harness_core::embedding::EmbeddingProvider;
use coverage_harness_core::models::Chunk;
use coverage_harness_core::store::{upsert_chunks, Store};
use coverage_harness_core::tokens::{Cl100kCounter, TokenCounter};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::{extract_pages, is_supported, ExtractionError};
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub const ALL_CHUNKS_FILE: &str = "all_chunks.json";
pub const SUMMARY_FILE: &str = "_parse_summary.json";

/// Per-file line of the parse summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub file: String,
    pub pages: usize,
    pub chunks: usize,
    pub total_tokens: usize,
    /// `"ok"` or `"error: <reason>"`.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Contents of `_parse_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: usize,
    pub files: Vec<FileStats>,
    pub errors: Vec<FileError>,
}

/// Result of [`run_ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub parse: ParseSummary,
    /// Chunks embedded and written in this run.
    pub embedded: usize,
    /// True when embedding was skipped because the store was already populated.
    pub skipped_embedding: bool,
    pub store_count: usize,
    pub elapsed_secs: f64,
}

/// Supported documents directly inside `dir`, sorted case-insensitively.
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Document directory not found: {}", dir.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path))
        .collect();
    files.sort_by_key(|path| file_name(path).to_lowercase());
    Ok(files)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract, detect sections, and chunk one document.
///
/// Returns the page count alongside the chunks.
pub fn parse_document(
    path: &Path,
    counter: &dyn TokenCounter,
    options: &ChunkOptions,
) -> Result<(usize, Vec<Chunk>), ExtractionError> {
    let started = Instant::now();
    let pages = extract_pages(path)?;
    let chunks = segment_document(&file_name(path), &pages, counter, options);
    tracing::info!(
        file = %path.display(),
        chunks = chunks.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "parsed document"
    );
    Ok((pages.len(), chunks))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Parse every document in `files`, writing `<stem>_chunks.json` per
/// document plus the combined chunk file and summary to `output_dir`.
pub fn parse_documents(
    files: &[PathBuf],
    output_dir: &Path,
    counter: &dyn TokenCounter,
    options: &ChunkOptions,
) -> Result<(ParseSummary, Vec<Chunk>)> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut stats = Vec::with_capacity(files.len());
    let mut errors = Vec::new();

    for (i, path) in files.iter().enumerate() {
        let name = file_name(path);
        tracing::info!(index = i + 1, total = files.len(), file = %name, "parsing");

        match parse_document(path, counter, options) {
            Ok((pages, chunks)) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                write_json(&output_dir.join(format!("{}_chunks.json", stem)), &chunks)?;
                stats.push(FileStats {
                    file: name,
                    pages,
                    chunks: chunks.len(),
                    total_tokens: chunks.iter().map(|c| c.token_count).sum(),
                    status: "ok".to_string(),
                });
                all_chunks.extend(chunks);
            }
            Err(e) => {
                tracing::error!(file = %name, error = %e, "document failed to parse");
                stats.push(FileStats {
                    file: name.clone(),
                    pages: 0,
                    chunks: 0,
                    total_tokens: 0,
                    status: format!("error: {}", e),
                });
                errors.push(FileError {
                    file: name,
                    error: e.to_string(),
                });
            }
        }
    }

    write_json(&output_dir.join(ALL_CHUNKS_FILE), &all_chunks)?;

    let total_tokens: usize = all_chunks.iter().map(|c| c.token_count).sum();
    let summary = ParseSummary {
        total_files: files.len(),
        successful: files.len() - errors.len(),
        failed: errors.len(),
        total_chunks: all_chunks.len(),
        total_tokens,
        avg_tokens_per_chunk: (total_tokens as f64 / all_chunks.len().max(1) as f64).round() as usize,
        files: stats,
        errors,
    };
    write_json(&output_dir.join(SUMMARY_FILE), &summary)?;

    Ok((summary, all_chunks))
}

/// Embed chunks in batches of `batch_size` and upsert them.
pub async fn embed_and_store(
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);
    let mut written = 0;

    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Failed to embed batch {}/{}", i + 1, total_batches))?;
        upsert_chunks(store, batch, &vectors).await?;
        written += batch.len();
        tracing::info!(batch = i + 1, total_batches, written, "embedded batch");
    }

    Ok(written)
}

/// Everything [`ingest_into`] needs besides the store and embedder.
pub struct IngestPlan<'a> {
    pub files: Vec<PathBuf>,
    pub output_dir: &'a Path,
    pub options: ChunkOptions,
    pub batch_size: usize,
    pub reset: bool,
}

/// Parse, export, and (unless already populated) embed into `store`.
pub async fn ingest_into(
    store: &dyn Store,
    embedder: &dyn EmbeddingProvider,
    counter: &dyn TokenCounter,
    plan: IngestPlan<'_>,
) -> Result<IngestSummary> {
    let started = Instant::now();
    let (parse, chunks) = parse_documents(&plan.files, plan.output_dir, counter, &plan.options)?;

    if plan.reset {
        tracing::info!("resetting vector store");
        store.reset().await?;
    }

    let existing = store.count().await?;
    let (embedded, skipped_embedding) = if !plan.reset && existing >= chunks.len() && existing > 0 {
        tracing::info!(
            existing,
            chunks = chunks.len(),
            "store already populated; skipping embedding (use --reset to rebuild)"
        );
        (0, true)
    } else {
        (
            embed_and_store(store, embedder, &chunks, plan.batch_size).await?,
            false,
        )
    };

    Ok(IngestSummary {
        parse,
        embedded,
        skipped_embedding,
        store_count: store.count().await?,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

/// `cov ingest`: parse the configured input directory into the SQLite store.
pub async fn run_ingest(config: &Config, input_dir: Option<&Path>, reset: bool) -> Result<IngestSummary> {
    let input_dir = input_dir.unwrap_or(config.documents.input_dir.as_path());
    let files = list_documents(input_dir)?;
    tracing::info!(count = files.len(), dir = %input_dir.display(), "found documents");

    let embedder = create_provider(&config.embedding)?;
    let counter = Cl100kCounter::new().context("Failed to load cl100k_base tokenizer")?;

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool, embedder.model_name());

    let summary = ingest_into(
        &store,
        embedder.as_ref(),
        &counter,
        IngestPlan {
            files,
            output_dir: &config.documents.output_dir,
            options: config.chunking.options(),
            batch_size: config.embedding.batch_size,
            reset,
        },
    )
    .await?;

    store.pool().close().await;
    Ok(summary)
}

/// `cov parse`: segment a file or directory and write JSON, without embedding.
pub fn run_parse(config: &Config, path: &Path) -> Result<ParseSummary> {
    let files = if path.is_dir() {
        list_documents(path)?
    } else if is_supported(path) {
        vec![path.to_path_buf()]
    } else {
        anyhow::bail!("Not a supported document: {}", path.display());
    };
    let counter = Cl100kCounter::new().context("Failed to load cl100k_base tokenizer")?;
    let (summary, _) = parse_documents(
        &files,
        &config.documents.output_dir,
        &counter,
        &config.chunking.options(),
    )?;
    Ok(summary)
}
