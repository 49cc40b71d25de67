//! Service handles shared by the CLI commands and the HTTP server.
//!
//! Everything is built once from [`Config`] and passed around as `Arc`s.

use anyhow::Result;
use std::sync::Arc;

use coverage_harness_core::embedding::EmbeddingProvider;
use coverage_harness_core::generation::GenerationService;
use coverage_harness_core::retrieval::MultiQueryRetriever;

use crate::agent::CoverageAgent;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

pub struct Services {
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationService>,
}

impl Services {
    /// Open the database (migrating if needed) and construct the providers.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool, embedder.model_name()));
        Ok(Self {
            store,
            embedder,
            generator,
        })
    }

    pub fn retriever(&self, config: &Config) -> MultiQueryRetriever {
        MultiQueryRetriever::new(
            self.store.clone(),
            self.embedder.clone(),
            self.generator.clone(),
            config.retrieval.options(),
        )
    }

    pub fn agent(&self, config: &Config) -> CoverageAgent {
        CoverageAgent::new(
            self.retriever(config),
            self.generator.clone(),
            config.generation.max_context_chars,
            config.generation.answer_top_k,
        )
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}
