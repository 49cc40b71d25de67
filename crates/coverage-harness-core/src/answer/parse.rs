//! Lenient JSON object extraction from raw model output.
//!
//! Attempts, in order:
//!
//! 1. the trimmed text as-is;
//! 2. the text with a leading/trailing code fence removed;
//! 3. the span from the first `{` to the last `}`.
//!
//! Only JSON objects count as a successful parse.

use std::sync::LazyLock;

use regex::Regex;

use super::loose::LooseValue;

static OPEN_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+\-]*[ \t]*\r?\n?").expect("open fence pattern"));

static CLOSE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("close fence pattern"));

/// Why raw text could not be turned into a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: String,
}

/// Result of the parse step.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(LooseValue),
    Unparseable(ParseFailure),
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match OPEN_FENCE_RE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let body = match CLOSE_FENCE_RE.find(body) {
        Some(m) => &body[..m.start()],
        None => body,
    };
    body.trim()
}

/// The text from the first `{` through the last `}`, if any.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(text: &str) -> Result<LooseValue, String> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() => Ok(LooseValue::from(value)),
        Ok(_) => Err("response JSON is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn parse_response(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Unparseable(ParseFailure {
            reason: "empty response".to_string(),
        });
    }

    let first_error = match parse_object(trimmed) {
        Ok(value) => return ParseOutcome::Parsed(value),
        Err(e) => e,
    };

    let unfenced = strip_code_fences(trimmed);
    if unfenced != trimmed {
        if let Ok(value) = parse_object(unfenced) {
            return ParseOutcome::Parsed(value);
        }
    }

    if let Some(span) = brace_span(unfenced) {
        if let Ok(value) = parse_object(span) {
            return ParseOutcome::Parsed(value);
        }
    }

    ParseOutcome::Unparseable(ParseFailure {
        reason: format!("Response was not valid JSON ({})", first_error),
    })
}
