//! Coverage question answering.
//!
//! [`CoverageAgent::ask`] runs one question end to end:
//!
//! 1. multi-query retrieval with `final_top_k = top_k`;
//! 2. optional case-insensitive filename filter;
//! 3. analyst prompt over the numbered excerpts;
//! 4. one structured-output generation call (no retry);
//! 5. normalization and citation backfill;
//! 6. diagnostic metadata.
//!
//! Generation failures and unparseable replies come back as fallback
//! verdicts, never as errors. Only retrieval failures (embedding or store)
//! are returned as `Err`.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use coverage_harness_core::answer::{normalize_response, Verdict};
use coverage_harness_core::generation::{GenerationRequest, GenerationService};
use coverage_harness_core::models::RetrievedHit;
use coverage_harness_core::prompt::{build_context, user_prompt, SYSTEM_PROMPT};
use coverage_harness_core::retrieval::MultiQueryRetriever;

/// Temperature for the analyst call.
pub const ANSWER_TEMPERATURE: f32 = 0.2;

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

pub struct CoverageAgent {
    retriever: MultiQueryRetriever,
    generator: Arc<dyn GenerationService>,
    max_context_chars: usize,
    default_top_k: usize,
}

impl CoverageAgent {
    pub fn new(
        retriever: MultiQueryRetriever,
        generator: Arc<dyn GenerationService>,
        max_context_chars: usize,
        default_top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            max_context_chars,
            default_top_k,
        }
    }

    pub fn retriever(&self) -> &MultiQueryRetriever {
        &self.retriever
    }

    pub fn generator(&self) -> &Arc<dyn GenerationService> {
        &self.generator
    }

    /// Answer `question`, optionally restricted to files whose name contains
    /// `filename_filter`. `top_k` defaults to the configured answer depth.
    pub async fn ask(
        &self,
        question: &str,
        filename_filter: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Verdict> {
        let started = Instant::now();
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);

        let mut options = *self.retriever.options();
        options.final_top_k = top_k;
        tracing::info!(question, top_k, "retrieving chunks");
        let retrieval = self.retriever.retrieve_with(question, &options).await?;

        let mut hits: Vec<RetrievedHit> = retrieval.hits;
        if let Some(filter) = filename_filter {
            let filter = filter.to_lowercase();
            hits.retain(|h| h.metadata.filename.to_lowercase().contains(&filter));
            tracing::info!(filter = %filter, remaining = hits.len(), "applied filename filter");
        }

        let mut llm_time_s = None;
        let mut verdict = if hits.is_empty() {
            tracing::warn!(question, "no chunks found");
            Verdict::no_evidence()
        } else {
            let context = build_context(&hits, self.max_context_chars);
            let request = GenerationRequest::new(user_prompt(question, &context))
                .with_system(SYSTEM_PROMPT)
                .with_temperature(ANSWER_TEMPERATURE)
                .json();

            tracing::info!(
                model = self.generator.model_name(),
                chunks = hits.len(),
                context_chars = context.chars().count(),
                "calling generation service"
            );
            let llm_started = Instant::now();
            match self.generator.generate(&request).await {
                Ok(raw) => {
                    let elapsed = llm_started.elapsed().as_secs_f64();
                    llm_time_s = Some(round2(elapsed));
                    tracing::info!(elapsed_secs = elapsed, chars = raw.len(), "generation complete");
                    normalize_response(&raw, &hits, question)
                }
                Err(e) => {
                    tracing::error!(error = %e, "generation failed");
                    Verdict::unreachable(e.to_string())
                }
            }
        };

        let meta = &mut verdict.meta;
        meta.question = question.to_string();
        meta.filename_filter = filename_filter.map(str::to_string);
        meta.model = Some(self.generator.model_name().to_string());
        meta.chunks_retrieved = hits.len();
        meta.query_variants = retrieval.query_variants;
        meta.llm_time_s = llm_time_s;
        meta.total_time_s = round2(started.elapsed().as_secs_f64());

        tracing::info!(
            covered = %verdict.covered,
            confidence = verdict.confidence,
            citations = verdict.citations.len(),
            caveats = verdict.caveats.len(),
            fallback = verdict.is_fallback(),
            "verdict ready"
        );
        Ok(verdict)
    }
}
