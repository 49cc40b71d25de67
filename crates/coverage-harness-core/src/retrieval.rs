//! # Multi-Query Retrieval
//!
//! A question is expanded into alternative phrasings, each phrasing is
//! searched independently, and the hits are merged by chunk id keeping
//! the **maximum** score seen for that chunk.
//!
//! ```text
//! question ─▶ expand_query ─▶ [q, v1, v2, v3] ─▶ embed ─▶ Store::query ×4
//!                                                              │
//!                            top final_top_k ◀── merge_hits ◀──┘
//! ```
//!
//! Expansion uses the generation service but never fails: any error or
//! malformed output falls back to [`heuristic_expand`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::answer::strip_code_fences;
use crate::embedding::EmbeddingProvider;
use crate::generation::{GenerationRequest, GenerationService};
use crate::models::RetrievedHit;
use crate::store::{rank_hits, Store};

pub const EXPANSION_TEMPERATURE: f32 = 0.4;

const EXPANSION_PROMPT: &str = "\
You are a health insurance domain expert. A user wants to find out whether \
something is covered by their health insurance policy.

Given the user's question below, generate exactly {n} alternative search \
queries that would help retrieve relevant passages from an insurance policy \
document. Each query should approach the topic from a different angle:

1. A more specific / technical version of the question.
2. A broader version that captures related concepts.
3. A version using common insurance terminology (exclusions, sub-limits, \
waiting periods, etc.).

USER QUESTION: {question}

Respond ONLY with a JSON array of {n} strings, no markdown and no explanation.
Example: [\"query one\", \"query two\", \"query three\"]
";

/// Retrieval knobs. Defaults match the `[retrieval]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub top_k_per_query: usize,
    pub final_top_k: usize,
    pub num_variants: usize,
    /// Upper bound on each per-variant store query.
    pub query_timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k_per_query: 8,
            final_top_k: 10,
            num_variants: 3,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one [`MultiQueryRetriever::retrieve`] call.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub question: String,
    /// Every query actually run, the original question first.
    pub query_variants: Vec<String>,
    /// Hits before de-duplication, across all variants.
    pub total_retrieved: usize,
    pub unique_chunks: usize,
    pub hits: Vec<RetrievedHit>,
    pub elapsed_secs: f64,
}

pub fn expansion_prompt(question: &str, n: usize) -> String {
    EXPANSION_PROMPT
        .replace("{n}", &n.to_string())
        .replace("{question}", question)
}

/// Deterministic expansion used whenever the generation service cannot help.
pub fn heuristic_expand(question: &str, n: usize) -> Vec<String> {
    let mut variants = vec![
        question.to_string(),
        format!("coverage policy benefits {}", question),
        format!("exclusions waiting period sub-limit {}", question),
    ];
    variants.truncate(n);
    variants
}

fn array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a generation reply as a JSON array of phrasings.
///
/// Non-string items are rendered as JSON text. Returns `None` for anything
/// that is not a non-empty array.
pub fn parse_variant_list(raw: &str, n: usize) -> Option<Vec<String>> {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .ok()
        .or_else(|| array_span(cleaned).and_then(|span| serde_json::from_str(span).ok()))?;

    let items = value.as_array()?;
    let variants: Vec<String> = items
        .iter()
        .take(n)
        .map(|item| match item {
            serde_json::Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect();

    (!variants.is_empty()).then_some(variants)
}

/// Ask the generation service for `n` alternative phrasings of `question`.
///
/// Never fails; errors are logged and replaced by [`heuristic_expand`].
pub async fn expand_query(generator: &dyn GenerationService, question: &str, n: usize) -> Vec<String> {
    let request = GenerationRequest::new(expansion_prompt(question, n))
        .with_temperature(EXPANSION_TEMPERATURE);

    let started = Instant::now();
    match generator.generate(&request).await {
        Ok(raw) => {
            tracing::debug!(
                elapsed_secs = started.elapsed().as_secs_f64(),
                raw = %raw,
                "query expansion reply"
            );
            match parse_variant_list(&raw, n) {
                Some(variants) => variants,
                None => {
                    tracing::warn!("query expansion reply was not a JSON array; using heuristic expansion");
                    heuristic_expand(question, n)
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "query expansion failed; using heuristic expansion");
            heuristic_expand(question, n)
        }
    }
}

/// The question followed by each variant not already present,
/// compared case-insensitively.
pub fn build_query_set(question: &str, variants: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(question.to_lowercase());
    let mut queries = vec![question.to_string()];
    for variant in variants {
        if seen.insert(variant.to_lowercase()) {
            queries.push(variant);
        }
    }
    queries
}

/// Collapse hits by chunk id keeping the highest score, then rank.
pub fn merge_hits(hits: impl IntoIterator<Item = RetrievedHit>) -> Vec<RetrievedHit> {
    let mut best: HashMap<String, RetrievedHit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.chunk_id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.chunk_id.clone(), hit);
            }
        }
    }
    let mut merged: Vec<RetrievedHit> = best.into_values().collect();
    rank_hits(&mut merged);
    merged
}

/// Retrieval engine wired to explicit service handles.
#[derive(Clone)]
pub struct MultiQueryRetriever {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationService>,
    options: RetrievalOptions,
}

impl MultiQueryRetriever {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationService>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            options,
        }
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Retrieve with the configured options.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        self.retrieve_with(question, &self.options).await
    }

    /// Expand, search every variant concurrently, merge, and truncate.
    ///
    /// Errors only when embedding or a store query fails or exceeds
    /// `query_timeout`; an empty store yields an empty result.
    pub async fn retrieve_with(
        &self,
        question: &str,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult> {
        let started = Instant::now();

        let variants = expand_query(self.generator.as_ref(), question, options.num_variants).await;
        let queries = build_query_set(question, variants);
        tracing::info!(count = queries.len(), queries = ?queries, "running query variants");

        let vectors = self
            .embedder
            .embed(&queries)
            .await
            .context("Failed to embed query variants")?;
        if vectors.len() != queries.len() {
            return Err(anyhow!(
                "embedding provider returned {} vectors for {} queries",
                vectors.len(),
                queries.len()
            ));
        }

        let searches = vectors.iter().map(|vector| {
            tokio::time::timeout(
                options.query_timeout,
                self.store.query(vector, options.top_k_per_query),
            )
        });
        let per_query = join_all(searches).await;

        let mut all_hits = Vec::new();
        for (i, outcome) in per_query.into_iter().enumerate() {
            let hits = outcome
                .map_err(|_| {
                    anyhow!(
                        "Store query for variant {} timed out after {:?}",
                        i + 1,
                        options.query_timeout
                    )
                })?
                .with_context(|| format!("Store query failed for variant {}", i + 1))?;
            tracing::debug!(
                variant = i + 1,
                hits = hits.len(),
                best = hits.first().map(|h| h.score).unwrap_or(0.0),
                "variant searched"
            );
            all_hits.extend(hits);
        }

        let total_retrieved = all_hits.len();
        let mut merged = merge_hits(all_hits);
        let unique_chunks = merged.len();
        merged.truncate(options.final_top_k);

        let elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            total_retrieved,
            unique_chunks,
            returned = merged.len(),
            elapsed_secs,
            "retrieval complete"
        );

        Ok(RetrievalResult {
            question: question.to_string(),
            query_variants: queries,
            total_retrieved,
            unique_chunks,
            hits: merged,
            elapsed_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::models::ChunkMetadata;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        reply: Result<String, ()>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(()) => Err(GenerationError::Unreachable {
                    url: "http://localhost:11434".to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    /// One-hot on whichever keyword appears earliest in the text.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["maternity", "exclusions", "ambulance", "coverage"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        fn dims(&self) -> usize {
            KEYWORDS.len()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    let first = KEYWORDS
                        .iter()
                        .enumerate()
                        .filter_map(|(i, k)| lower.find(k).map(|pos| (pos, i)))
                        .min()
                        .map(|(_, i)| i);
                    (0..KEYWORDS.len())
                        .map(|i| if Some(i) == first { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    fn hit(id: &str, score: f64) -> RetrievedHit {
        RetrievedHit {
            chunk_id: id.to_string(),
            text: format!("text {}", id),
            score,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_heuristic_expand() {
        let variants = heuristic_expand("Is knee surgery covered?", 3);
        assert_eq!(
            variants,
            vec![
                "Is knee surgery covered?",
                "coverage policy benefits Is knee surgery covered?",
                "exclusions waiting period sub-limit Is knee surgery covered?",
            ]
        );
        assert_eq!(heuristic_expand("q", 1), vec!["q"]);
    }

    #[test]
    fn test_parse_variant_list() {
        assert_eq!(
            parse_variant_list("```json\n[\"a\", \"b\", \"c\", \"d\"]\n```", 3),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            parse_variant_list("Here you go: [\"x\", 2]", 3),
            Some(vec!["x".to_string(), "2".to_string()])
        );
        assert_eq!(parse_variant_list("[]", 3), None);
        assert_eq!(parse_variant_list("{\"queries\": [\"a\"]}", 3), None);
        assert_eq!(parse_variant_list("no list here", 3), None);
    }

    #[test]
    fn test_build_query_set_dedup() {
        let queries = build_query_set(
            "Is maternity covered?",
            vec![
                "IS MATERNITY COVERED?".to_string(),
                "maternity benefits".to_string(),
                "Maternity Benefits".to_string(),
            ],
        );
        assert_eq!(queries, vec!["Is maternity covered?", "maternity benefits"]);
    }

    #[test]
    fn test_merge_keeps_max_score() {
        let merged = merge_hits(vec![
            hit("a", 0.8),
            hit("b", 0.7),
            hit("a", 0.9),
            hit("c", 0.6),
        ]);
        let ids: Vec<&str> = merged.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((merged[0].score - 0.9).abs() < 1e-12);
        assert!((merged[1].score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let forward = merge_hits(vec![hit("a", 0.8), hit("b", 0.7), hit("a", 0.9)]);
        let backward = merge_hits(vec![hit("a", 0.9), hit("b", 0.7), hit("a", 0.8)]);
        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn test_expand_query_uses_generator_reply() {
        let generator = ScriptedGenerator::replying(r#"["maternity waiting period", "childbirth benefits", "pregnancy exclusions"]"#);
        let variants = expand_query(&generator, "Is maternity covered?", 3).await;
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0], "maternity waiting period");
        let requests = generator.requests.lock().unwrap();
        assert!((requests[0].temperature - EXPANSION_TEMPERATURE).abs() < f32::EPSILON);
        assert!(requests[0].prompt.contains("USER QUESTION: Is maternity covered?"));
    }

    #[tokio::test]
    async fn test_expand_query_falls_back() {
        let failing = ScriptedGenerator::failing();
        assert_eq!(
            expand_query(&failing, "q", 3).await,
            heuristic_expand("q", 3)
        );

        let garbage = ScriptedGenerator::replying("I think you should search for maternity.");
        assert_eq!(
            expand_query(&garbage, "q", 2).await,
            heuristic_expand("q", 2)
        );
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let docs = [
            ("policy__chunk_0001", vec![1.0, 0.0, 0.0, 0.0]),
            ("policy__chunk_0002", vec![0.0, 1.0, 0.0, 0.0]),
            ("policy__chunk_0003", vec![0.0, 0.0, 1.0, 0.0]),
            ("policy__chunk_0004", vec![0.0, 0.0, 0.0, 1.0]),
        ];
        for (id, vector) in docs {
            store
                .upsert(id, id, &vector, &ChunkMetadata::default())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_retrieve_with_heuristic_variants() {
        let retriever = MultiQueryRetriever::new(
            seeded_store().await,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::failing()),
            RetrievalOptions {
                top_k_per_query: 1,
                final_top_k: 10,
                num_variants: 3,
                ..Default::default()
            },
        );
        let result = retriever.retrieve("maternity").await.unwrap();

        // The first heuristic variant equals the question and is skipped.
        assert_eq!(result.query_variants.len(), 3);
        assert_eq!(result.total_retrieved, 3);
        assert_eq!(result.unique_chunks, 3);
        assert!(result
            .hits
            .iter()
            .any(|h| h.chunk_id == "policy__chunk_0001"));
        assert!(result
            .hits
            .iter()
            .any(|h| h.chunk_id == "policy__chunk_0002"));
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_retrieve_truncates_to_final_top_k() {
        let retriever = MultiQueryRetriever::new(
            seeded_store().await,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::failing()),
            RetrievalOptions {
                top_k_per_query: 4,
                final_top_k: 2,
                num_variants: 3,
                ..Default::default()
            },
        );
        let result = retriever.retrieve("maternity").await.unwrap();
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.unique_chunks, 4);
        assert_eq!(result.total_retrieved, 12);
    }

    #[tokio::test]
    async fn test_retrieve_empty_store() {
        let retriever = MultiQueryRetriever::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::failing()),
            RetrievalOptions::default(),
        );
        let result = retriever.retrieve("anything").await.unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.total_retrieved, 0);
        assert_eq!(result.unique_chunks, 0);
    }

    /// Never answers within any reasonable timeout.
    struct StalledStore;

    #[async_trait]
    impl Store for StalledStore {
        async fn upsert(&self, _: &str, _: &str, _: &[f32], _: &ChunkMetadata) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _: &[f32], _: usize) -> Result<Vec<RetrievedHit>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }

        async fn reset(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stalled_store_query_times_out() {
        let retriever = MultiQueryRetriever::new(
            Arc::new(StalledStore),
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::failing()),
            RetrievalOptions {
                query_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let started = Instant::now();
        let err = retriever.retrieve("maternity").await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err:#}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
