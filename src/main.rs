//! # Coverage Harness CLI (`cov`)
//!
//! ## Usage
//!
//! ```bash
//! cov --config ./config/cov.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cov init` | Create the SQLite database and run schema migrations |
//! | `cov parse <path>` | Segment a file or directory into JSON chunks (no embedding) |
//! | `cov ingest [--reset]` | Parse, embed, and store every document in the input directory |
//! | `cov search "<query>"` | Multi-query retrieval only, prints ranked chunks |
//! | `cov ask "<question>"` | Full verdict with citations |
//! | `cov stats` | Index statistics |
//! | `cov serve` | Start the JSON HTTP API |
//!
//! Logs go to stderr; set `COV_LOG` (e.g. `COV_LOG=debug`) to change the level.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use coverage_harness::{config, ingest, migrate, search, server, services, stats};
use coverage_harness_core::answer::Verdict;

/// Coverage Harness CLI: cited coverage verdicts over policy documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cov.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cov",
    about = "Coverage Harness: cited coverage verdicts over policy documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cov.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Segment one document or a directory and write JSON chunk exports.
    ///
    /// Does not embed or touch the database.
    Parse {
        /// A `.pdf`/`.txt` file or a directory of them.
        path: PathBuf,
    },

    /// Parse, embed, and store every document in the input directory.
    ///
    /// Embedding is skipped when the store already holds at least as many
    /// vectors as there are chunks, unless `--reset` is given.
    Ingest {
        /// Clear the store and re-embed everything.
        #[arg(long)]
        reset: bool,

        /// Override `[documents].input_dir`.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Multi-query retrieval without generating an answer.
    Search {
        query: String,

        /// Number of chunks to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a coverage question with a cited verdict.
    Ask {
        question: String,

        /// Only use chunks from files whose name contains this text.
        #[arg(long)]
        file: Option<String>,

        /// Chunks handed to the model (default `[generation].answer_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("COV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_verdict(verdict: &Verdict) {
    println!("Covered:     {}", verdict.covered);
    println!("Confidence:  {:.2}", verdict.confidence);
    println!();
    println!("{}", verdict.explanation);

    if !verdict.citations.is_empty() {
        println!();
        println!("Citations:");
        for (i, c) in verdict.citations.iter().enumerate() {
            println!("  {}. {} p. {} / {}", i + 1, c.file, c.page, c.section);
            if !c.quote.is_empty() {
                println!("     \"{}\"", c.quote);
            }
        }
    }

    if !verdict.caveats.is_empty() {
        println!();
        println!("Caveats:");
        for caveat in &verdict.caveats {
            println!("  - {}", caveat);
        }
    }

    let meta = &verdict.meta;
    println!();
    println!(
        "({} chunks, {} queries, {:.2}s{})",
        meta.chunks_retrieved,
        meta.query_variants.len(),
        meta.total_time_s,
        if meta.fallback { ", fallback" } else { "" }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Parse { path } => {
            let summary = ingest::run_parse(&cfg, &path)?;
            println!(
                "Parsed {} file(s): {} ok, {} failed, {} chunks, {} tokens (avg {}/chunk)",
                summary.total_files,
                summary.successful,
                summary.failed,
                summary.total_chunks,
                summary.total_tokens,
                summary.avg_tokens_per_chunk
            );
            for err in &summary.errors {
                println!("  failed: {} ({})", err.file, err.error);
            }
            println!("Output: {}", cfg.documents.output_dir.display());
        }
        Commands::Ingest { reset, input } => {
            let summary = ingest::run_ingest(&cfg, input.as_deref(), reset).await?;
            println!(
                "Ingested {} file(s) ({} failed): {} chunks",
                summary.parse.successful, summary.parse.failed, summary.parse.total_chunks
            );
            if summary.skipped_embedding {
                println!("  embedding skipped: store already holds {} vectors (use --reset to rebuild)", summary.store_count);
            } else {
                println!("  embedded: {}", summary.embedded);
            }
            println!("  store: {} vectors", summary.store_count);
            println!("  elapsed: {:.1}s", summary.elapsed_secs);
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask {
            question,
            file,
            top_k,
            json,
        } => {
            let services = services::Services::open(&cfg).await?;
            let verdict = services
                .agent(&cfg)
                .ask(&question, file.as_deref(), top_k)
                .await?;
            services.close().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print_verdict(&verdict);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
