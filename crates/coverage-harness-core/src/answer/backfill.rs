//! Citation backfill from retrieved chunks.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::RetrievedHit;

use super::normalize::{truncate_chars, Citation};

/// Sentences shorter than this are never chosen by overlap.
const MIN_CANDIDATE_CHARS: usize = 20;
/// Minimum length of the first-sentence fallback.
const MIN_FALLBACK_CHARS: usize = 30;
const PREFIX_CHARS: usize = 300;
/// Citations synthesized when the verdict carries none.
pub const SYNTHESIZED_CITATIONS: usize = 3;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w{3,}").expect("word pattern"));

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.;!?]\s+").expect("sentence end pattern"));

fn words(text: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        out.push(text[last..m.start() + 1].trim());
        last = m.end();
    }
    out.push(text[last..].trim());
    out
}

/// Pick the sentence of `text` sharing the most words with `question`.
///
/// Ties go to the earlier sentence. With no overlap at all, returns the
/// first sentence of reasonable length, or else a prefix of the text.
pub fn best_sentence(text: &str, question: &str) -> String {
    let question_words = words(question);
    let sentences = sentences(text);

    let mut best: Option<(usize, &str)> = None;
    for sentence in sentences
        .iter()
        .filter(|s| s.chars().count() >= MIN_CANDIDATE_CHARS)
    {
        let score = words(sentence).intersection(&question_words).count();
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, sentence));
        }
    }

    match best {
        Some((score, sentence)) if score > 0 => sentence.to_string(),
        _ => sentences
            .iter()
            .find(|s| s.chars().count() >= MIN_FALLBACK_CHARS)
            .map(|s| truncate_chars(s, PREFIX_CHARS))
            .unwrap_or_else(|| truncate_chars(text.trim(), PREFIX_CHARS)),
    }
}

fn source_for<'a>(citation: &Citation, hits: &'a [RetrievedHit]) -> Option<(&'a RetrievedHit, bool)> {
    let file = citation.file.to_lowercase();
    let file_matches = |hit: &&RetrievedHit| hit.metadata.filename.to_lowercase().contains(&file);

    hits.iter()
        .filter(file_matches)
        .find(|hit| hit.metadata.spans_page(citation.page))
        .or_else(|| hits.iter().find(file_matches))
        .map(|hit| (hit, true))
        .or_else(|| hits.first().map(|hit| (hit, false)))
}

/// Fill empty quotes from the retrieved chunks and drop what cannot be filled.
///
/// Lookup order: filename substring plus page range, then filename only,
/// then the top-ranked chunk. When the top-ranked fallback is used, the
/// citation's location is replaced by that chunk's so the quote and its
/// provenance agree. A verdict without any citations gets up to
/// [`SYNTHESIZED_CITATIONS`] from the top chunks.
pub fn backfill_citations(
    mut citations: Vec<Citation>,
    hits: &[RetrievedHit],
    question: &str,
) -> Vec<Citation> {
    for citation in citations.iter_mut() {
        if !citation.quote.trim().is_empty() {
            continue;
        }
        if let Some((hit, matched)) = source_for(citation, hits) {
            citation.quote = best_sentence(&hit.text, question);
            if !matched {
                citation.file = hit.metadata.filename.clone();
                citation.page = hit.metadata.page_number;
                citation.section = hit.metadata.section_title.clone();
            }
        }
    }

    if citations.is_empty() {
        citations = hits
            .iter()
            .take(SYNTHESIZED_CITATIONS)
            .map(|hit| Citation {
                file: hit.metadata.filename.clone(),
                page: hit.metadata.page_number,
                section: hit.metadata.section_title.clone(),
                quote: best_sentence(&hit.text, question),
            })
            .collect();
    }

    citations.retain(|c| !c.quote.trim().is_empty());
    citations
}
