//! # Answer Normalization
//!
//! Turns the raw text of a generation response into a canonical
//! [`Verdict`]. The pipeline never fails:
//!
//! ```text
//! raw text ──► parse ──► flatten ──► map fields ──► backfill citations ──► Verdict
//!                │
//!                └── unparseable ──► fallback Verdict (fallback = true)
//! ```
//!
//! Loosely-typed JSON lives only inside this module; callers see typed
//! [`Verdict`] values.

pub mod backfill;
pub mod loose;
pub mod normalize;
pub mod parse;

pub use backfill::{backfill_citations, best_sentence};
pub use normalize::{map_verdict, Citation, Coverage, Verdict, VerdictMeta};
pub use parse::{parse_response, strip_code_fences, ParseFailure, ParseOutcome};

use crate::models::RetrievedHit;

/// Normalize a raw model response against the chunks it was shown.
///
/// Metadata other than the fallback flag, error and raw response is left
/// for the caller.
pub fn normalize_response(raw: &str, hits: &[RetrievedHit], question: &str) -> Verdict {
    match parse_response(raw) {
        ParseOutcome::Parsed(value) => {
            let mut verdict = map_verdict(&value.flatten());
            verdict.citations = backfill_citations(verdict.citations, hits, question);
            verdict
        }
        ParseOutcome::Unparseable(failure) => {
            tracing::warn!(reason = %failure.reason, "unparseable generation response");
            Verdict::unparseable(&failure, raw)
        }
    }
}
