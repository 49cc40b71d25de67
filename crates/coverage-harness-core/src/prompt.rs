//! Prompt assembly for the coverage analyst.

use crate::models::RetrievedHit;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Below this many remaining characters an overflowing excerpt is dropped
/// instead of truncated.
const MIN_TRUNCATED_BLOCK_CHARS: usize = 200;

const TRUNCATION_MARKER: &str = "\n…[truncated]";

pub const SYSTEM_PROMPT: &str = r#"You are a health insurance policy analyst. The user will give you a question and policy document excerpts. You MUST answer the EXACT question asked.

STEPS:
1. Read the user's question carefully.
2. Search the provided excerpts for text that directly answers the question.
3. Determine: is the item covered ("Yes"), excluded ("No"), conditionally covered ("Partial"), or not found in the excerpts ("Unknown").
4. Write a concise 2-4 sentence explanation that DIRECTLY answers the question.
5. Provide exact quote(s) from the excerpts as citations. Never leave quotes empty.
6. List any relevant caveats (waiting periods, sub-limits, conditions).

RULES:
- "covered": "Yes" if clearly covered. "No" if excluded. "Partial" if covered with conditions/waiting periods. "Unknown" if excerpts don't address it.
- "confidence": 0.9+ if the excerpts clearly answer the question. 0.5-0.8 if somewhat relevant. Below 0.5 if unsure.
- Each citation MUST include a "quote" with at least one full sentence copied verbatim from the excerpts.
- Only mention caveats relevant to the user's specific question.
- Do NOT include general policy information unrelated to the question.

Respond with ONLY this JSON (no other text):
{"covered": "Yes", "confidence": 0.92, "explanation": "Knee replacement surgery is covered as an inpatient surgical procedure under Section 4.", "citations": [{"file": "policy.pdf", "page": 5, "section": "Benefits", "quote": "All daycare and inpatient surgical procedures including joint replacement are covered up to the sum insured"}], "caveats": ["48-month waiting period for joint replacements"]}
"#;

/// User turn: the question, the excerpt block, and a schema reminder.
pub fn user_prompt(question: &str, context: &str) -> String {
    format!(
        "QUESTION: {question}\n\n\
         Below are the most relevant excerpts from health insurance policy documents. \
         Each excerpt is tagged with its source file, page number, and section.\n\n\
         {context}\n\n\
         Remember: Your explanation must directly answer \"{question}\".\n\
         Respond with ONLY the JSON: {{\"covered\": ..., \"confidence\": ..., \"explanation\": ..., \"citations\": [...], \"caveats\": [...]}}\n"
    )
}

fn excerpt_block(index: usize, hit: &RetrievedHit) -> String {
    let meta = &hit.metadata;
    format!(
        "[Excerpt {}]  File: {}  |  Page: {}–{}  |  Section: {}\n{}\n",
        index, meta.filename, meta.page_number, meta.page_end, meta.section_title, hit.text
    )
}

/// Number the hits as excerpts, stopping at `max_chars`.
///
/// The excerpt that would cross the budget is cut and marked when enough
/// room remains, otherwise dropped. Nothing after it is included.
pub fn build_context(hits: &[RetrievedHit], max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for (i, hit) in hits.iter().enumerate() {
        let block = excerpt_block(i + 1, hit);
        let len = block.chars().count();
        if total + len > max_chars {
            let remaining = max_chars - total;
            if remaining > MIN_TRUNCATED_BLOCK_CHARS {
                let mut cut: String = block.chars().take(remaining).collect();
                cut.push_str(TRUNCATION_MARKER);
                parts.push(cut);
            }
            break;
        }
        parts.push(block);
        total += len;
    }

    parts.join("\n")
}
