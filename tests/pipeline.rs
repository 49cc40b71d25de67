//! Ingest a small policy into an in-memory store and answer questions
//! against it with scripted embedding and generation services.

use async_trait::async_trait;
use std::sync::Arc;

use coverage_harness::agent::CoverageAgent;
use coverage_harness::ingest::{ingest_into, list_documents, IngestPlan};
use coverage_harness_core::answer::Coverage;
use coverage_harness_core::chunk::ChunkOptions;
use coverage_harness_core::embedding::EmbeddingProvider;
use coverage_harness_core::generation::{GenerationError, GenerationRequest, GenerationService};
use coverage_harness_core::retrieval::{MultiQueryRetriever, RetrievalOptions};
use coverage_harness_core::store::memory::InMemoryStore;
use coverage_harness_core::store::Store;
use coverage_harness_core::tokens::WhitespaceCounter;

const TOPICS: [&str; 4] = ["ambulance", "dental", "maternity", "room"];

/// Bag-of-topics embedding: one dimension per topic keyword.
struct TopicEmbedder;

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topics"
    }
    fn dims(&self) -> usize {
        TOPICS.len()
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = TOPICS
                    .iter()
                    .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                    .collect();
                if v.iter().all(|x| *x == 0.0) {
                    v = vec![0.1; TOPICS.len()];
                }
                v
            })
            .collect())
    }
}

struct ScriptedLlm {
    answer: String,
}

#[async_trait]
impl GenerationService for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        if request.system.is_none() {
            // Query expansion: a fenced list, as models often return.
            return Ok("```json\n[\"dental treatment exclusion\", \"teeth accident cover\"]\n```".to_string());
        }
        Ok(self.answer.clone())
    }
}

const POLICY: &str = "SECTION 1 BENEFITS\n\
Room rent is covered up to one percent of the sum insured per day.\n\
Ambulance charges are covered up to 2000 per hospitalisation.\x0c\
SECTION 2 EXCLUSIONS\n\
Dental treatment is excluded unless necessitated by an accident.\n\
Maternity expenses are excluded during the first year.";

async fn ingested_store() -> (Arc<InMemoryStore>, tempfile::TempDir) {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("gold_policy.txt"), POLICY).unwrap();
    std::fs::write(input.path().join("rider.txt"), "Ambulance cover is extended to air ambulance.").unwrap();

    let store = Arc::new(InMemoryStore::new());
    let summary = ingest_into(
        store.as_ref(),
        &TopicEmbedder,
        &WhitespaceCounter,
        IngestPlan {
            files: list_documents(input.path()).unwrap(),
            output_dir: output.path(),
            options: ChunkOptions {
                target_tokens: 12,
                overlap_tokens: 0,
            },
            batch_size: 2,
            reset: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.parse.successful, 2);
    assert_eq!(store.count().await.unwrap(), summary.parse.total_chunks);
    (store, output)
}

fn agent(store: Arc<InMemoryStore>, answer: &str) -> CoverageAgent {
    let generator: Arc<dyn GenerationService> = Arc::new(ScriptedLlm {
        answer: answer.to_string(),
    });
    let retriever = MultiQueryRetriever::new(
        store,
        Arc::new(TopicEmbedder),
        generator.clone(),
        RetrievalOptions::default(),
    );
    CoverageAgent::new(retriever, generator, 12_000, 5)
}

#[tokio::test]
async fn test_wrapped_answer_is_normalized_and_backfilled() {
    let (store, _out) = ingested_store().await;
    let answer = r#"```json
{
  "covered": {"type": "string", "value": "No"},
  "confidence": {"value": "0.85"},
  "explanation": ["Dental treatment is excluded", "unless caused by an accident."],
  "citations": [
    {"file": "gold_policy", "page": "2", "section": "SECTION 2 EXCLUSIONS"},
    {"file": "gold_policy.txt", "page": 2, "section": "SECTION 2 EXCLUSIONS", "quote": ""}
  ],
  "caveats": [{"text": "Accidental dental injury is covered"}]
}
```"#;
    let verdict = agent(store, answer)
        .ask("Is dental treatment covered?", None, None)
        .await
        .unwrap();

    assert_eq!(verdict.covered, Coverage::No);
    assert!((verdict.confidence - 0.85).abs() < 1e-9);
    assert_eq!(
        verdict.explanation,
        "Dental treatment is excluded unless caused by an accident."
    );
    assert_eq!(verdict.caveats, vec!["Accidental dental injury is covered"]);
    assert_eq!(verdict.citations.len(), 2);
    assert_eq!(verdict.citations[0].file, "gold_policy");
    assert_eq!(verdict.citations[1].file, "gold_policy.txt");
    for citation in &verdict.citations {
        assert_eq!(citation.page, 2);
        assert!(citation.quote.contains("Dental treatment is excluded"), "{}", citation.quote);
    }
    assert_eq!(
        verdict.meta.query_variants,
        vec![
            "Is dental treatment covered?",
            "dental treatment exclusion",
            "teeth accident cover"
        ]
    );
    assert!(!verdict.is_fallback());
}

#[tokio::test]
async fn test_empty_citations_are_synthesized_from_top_chunks() {
    let (store, _out) = ingested_store().await;
    let answer = r#"{"covered": "yes", "confidence": true, "explanation": "Ambulance charges are covered.", "citations": []}"#;
    let verdict = agent(store, answer)
        .ask("Are ambulance charges covered?", None, Some(4))
        .await
        .unwrap();

    assert_eq!(verdict.covered, Coverage::Yes);
    assert_eq!(verdict.confidence, 1.0);
    assert!(!verdict.citations.is_empty());
    assert!(verdict.citations.len() <= 3);
    assert!(verdict.citations.iter().all(|c| !c.quote.is_empty()));
    assert!(verdict.citations[0].quote.to_lowercase().contains("ambulance"));
}

#[tokio::test]
async fn test_unparseable_answer_is_salvaged() {
    let (store, _out) = ingested_store().await;
    let answer = "The policy clearly covers ambulance charges up to 2000 per hospitalisation, subject to limits.";
    let verdict = agent(store, answer)
        .ask("Are ambulance charges covered?", Some("gold"), None)
        .await
        .unwrap();

    assert!(verdict.is_fallback());
    assert_eq!(verdict.covered, Coverage::Unknown);
    assert!(verdict.explanation.starts_with("Could not determine coverage."));
    assert!(verdict.explanation.contains(answer));
    assert_eq!(verdict.meta.raw_response.as_deref(), Some(answer));
    assert!(verdict.citations.is_empty());
}
