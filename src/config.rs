//! Configuration parsing and validation.
//!
//! Coverage Harness is configured via a TOML file (default:
//! `config/cov.toml`). Every section except `[db]` has defaults, so a
//! minimal file only needs the database path.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/cov.sqlite"
//!
//! [documents]
//! input_dir = "./pdfs"
//! output_dir = "./parsed"
//!
//! [chunking]
//! target_tokens = 800
//! overlap_tokens = 100
//!
//! [retrieval]
//! top_k_per_query = 8
//! final_top_k = 10
//! num_variants = 3
//! query_timeout_secs = 30
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "ollama"
//! model = "llama3"
//! url = "http://localhost:11434"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coverage_harness_core::chunk::ChunkOptions;
use coverage_harness_core::prompt::DEFAULT_MAX_CONTEXT_CHARS;
use coverage_harness_core::retrieval::RetrievalOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Directory scanned for `*.pdf` and `*.txt` policy documents.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Where per-document chunk JSON and the parse summary are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./pdfs")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./parsed")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            target_tokens: self.target_tokens,
            overlap_tokens: self.overlap_tokens,
        }
    }
}

fn default_target_tokens() -> usize {
    800
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_per_query")]
    pub top_k_per_query: usize,
    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,
    #[serde(default = "default_num_variants")]
    pub num_variants: usize,
    /// Per-variant vector-store query timeout.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_per_query: default_top_k_per_query(),
            final_top_k: default_final_top_k(),
            num_variants: default_num_variants(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl RetrievalConfig {
    pub fn options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k_per_query: self.top_k_per_query,
            final_top_k: self.final_top_k,
            num_variants: self.num_variants,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
        }
    }
}

fn default_query_timeout() -> u64 {
    30
}

fn default_top_k_per_query() -> usize {
    8
}
fn default_final_top_k() -> usize {
    10
}
fn default_num_variants() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Service base URL. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Chunks handed to the analyst prompt per question.
    #[serde(default = "default_answer_top_k")]
    pub answer_top_k: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout(),
            max_context_chars: default_max_context_chars(),
            answer_top_k: default_answer_top_k(),
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "llama3".to_string()
}
fn default_generation_timeout() -> u64 {
    180
}
fn default_max_context_chars() -> usize {
    DEFAULT_MAX_CONTEXT_CHARS
}
fn default_answer_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.target_tokens == 0 {
        bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    // Validate retrieval
    if config.retrieval.top_k_per_query < 1 {
        bail!("retrieval.top_k_per_query must be >= 1");
    }
    if config.retrieval.final_top_k < 1 {
        bail!("retrieval.final_top_k must be >= 1");
    }
    if config.retrieval.query_timeout_secs == 0 {
        bail!("retrieval.query_timeout_secs must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.generation.answer_top_k < 1 {
        bail!("generation.answer_top_k must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/cov.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.target_tokens, 800);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert_eq!(config.retrieval.options(), RetrievalOptions::default());
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.model, "llama3");
        assert_eq!(config.generation.timeout_secs, 180);
        assert_eq!(config.generation.answer_top_k, 5);
        assert_eq!(config.documents.input_dir, PathBuf::from("./pdfs"));
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_rejects_overlap_not_below_target() {
        let err = parse_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\ntarget_tokens = 100\noverlap_tokens = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let err = parse_config("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"magic\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let err = parse_config("[db]\npath = \"x.sqlite\"\n[generation]\nprovider = \"magic\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"ollama\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let config = parse_config(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        assert!(config.embedding.is_enabled());
    }

    #[test]
    fn test_query_timeout_flows_into_retrieval_options() {
        let config = parse_config("[db]\npath = \"x.sqlite\"\n[retrieval]\nquery_timeout_secs = 5\n")
            .unwrap();
        assert_eq!(config.retrieval.options().query_timeout, Duration::from_secs(5));

        let err = parse_config("[db]\npath = \"x.sqlite\"\n[retrieval]\nquery_timeout_secs = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("query_timeout_secs"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/cov.example.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.retrieval.options(), RetrievalOptions::default());
        assert_eq!(config.generation.answer_top_k, 5);
    }
}
