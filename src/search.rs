//! `cov search`: retrieval only, no generation of an answer.
//!
//! Prints the query variants followed by the ranked, deduplicated hits.

use anyhow::Result;

use coverage_harness_core::retrieval::RetrievalResult;

use crate::config::Config;
use crate::services::Services;

const EXCERPT_CHARS: usize = 240;

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let services = Services::open(config).await?;
    let retriever = services.retriever(config);

    let mut options = *retriever.options();
    if let Some(limit) = limit {
        options.final_top_k = limit.max(1);
    }
    let result = retriever.retrieve_with(query, &options).await?;
    print!("{}", format_result(&result));

    services.close().await;
    Ok(())
}

/// Render a retrieval result the way `cov search` prints it.
pub fn format_result(result: &RetrievalResult) -> String {
    let mut out = String::new();
    out.push_str("Queries:\n");
    for (i, q) in result.query_variants.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, q));
    }
    out.push_str(&format!(
        "Retrieved {} ({} unique) in {:.2}s\n\n",
        result.total_retrieved, result.unique_chunks, result.elapsed_secs
    ));

    if result.hits.is_empty() {
        out.push_str("No results.\n");
        return out;
    }

    for (i, hit) in result.hits.iter().enumerate() {
        let m = &hit.metadata;
        let pages = if m.page_end > m.page_number {
            format!("pp. {}-{}", m.page_number, m.page_end)
        } else {
            format!("p. {}", m.page_number)
        };
        out.push_str(&format!(
            "{}. [{:.3}] {} {} / {}\n",
            i + 1,
            hit.score,
            m.filename,
            pages,
            m.section_title
        ));
        let excerpt: String = hit
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(EXCERPT_CHARS)
            .collect();
        out.push_str(&format!("    excerpt: \"{}\"\n", excerpt));
        out.push_str(&format!("    id: {}\n\n", hit.chunk_id));
    }
    out
}
