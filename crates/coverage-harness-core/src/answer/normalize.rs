//! Canonical verdict types and the loose-to-strict field mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::loose::{LooseValue, Scalar};
use super::parse::ParseFailure;

/// Explanations shorter than this are replaced by salvaged free-text fields.
pub const MIN_EXPLANATION_CHARS: usize = 30;
/// Unrecognised top-level strings must be longer than this to be salvaged.
pub const MIN_SALVAGE_CHARS: usize = 10;
pub const MAX_EXPLANATION_CHARS: usize = 1000;
pub const MAX_RAW_RESPONSE_CHARS: usize = 2000;
/// Raw text longer than this (trimmed) is quoted in a fallback's explanation.
pub const MIN_RAW_SALVAGE_CHARS: usize = 20;
pub const MAX_RAW_SALVAGE_CHARS: usize = 500;

pub const NO_EVIDENCE_EXPLANATION: &str =
    "No relevant policy excerpts were found for this question.";

const KNOWN_KEYS: &[&str] = &[
    "covered",
    "answer",
    "confidence",
    "explanation",
    "citations",
    "caveats",
    "type",
    "value",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Coverage {
    Yes,
    No,
    Partial,
    #[default]
    Unknown,
}

impl Coverage {
    /// Case-insensitive match; anything unrecognised is `Unknown`.
    pub fn from_loose(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "yes" => Coverage::Yes,
            "no" => Coverage::No,
            "partial" => Coverage::Partial,
            _ => Coverage::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Coverage::Yes => "Yes",
            Coverage::No => "No",
            Coverage::Partial => "Partial",
            Coverage::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Citation {
    pub file: String,
    pub page: u32,
    pub section: String,
    pub quote: String,
}

/// Diagnostics attached to every verdict. Not part of the semantic contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VerdictMeta {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub chunks_retrieved: usize,
    #[serde(default)]
    pub query_variants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_time_s: Option<f64>,
    #[serde(default)]
    pub total_time_s: f64,
    /// Set when the verdict could not be derived from a structured answer.
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// The canonical, validated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Verdict {
    pub covered: Coverage,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<Citation>,
    pub caveats: Vec<String>,
    #[serde(rename = "_meta", default)]
    pub meta: VerdictMeta,
}

impl Verdict {
    pub fn is_fallback(&self) -> bool {
        self.meta.fallback
    }

    /// Verdict returned when retrieval produced nothing to reason over.
    pub fn no_evidence() -> Self {
        Verdict {
            explanation: NO_EVIDENCE_EXPLANATION.to_string(),
            ..Default::default()
        }
    }

    /// Fallback for output that could not be parsed.
    ///
    /// The explanation states the failure and quotes a prefix of raw text of
    /// meaningful length. A longer prefix is kept in the metadata.
    pub fn unparseable(failure: &ParseFailure, raw: &str) -> Self {
        let mut verdict = Self::fallback(
            format!(
                "Could not determine coverage. The model response could not be parsed as valid JSON. Error: {}",
                failure.reason
            ),
            failure.reason.clone(),
        );
        let salvaged = raw.trim();
        if salvaged.chars().count() > MIN_RAW_SALVAGE_CHARS {
            verdict.explanation = format!(
                "{} Model response began: {}",
                verdict.explanation,
                truncate_chars(salvaged, MAX_RAW_SALVAGE_CHARS)
            );
        }
        verdict.meta.raw_response = Some(truncate_chars(raw, MAX_RAW_RESPONSE_CHARS));
        verdict
    }

    /// Fallback for a generation service that could not be reached.
    pub fn unreachable(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::fallback(
            format!(
                "Could not determine coverage. The generation service could not be reached. Error: {}",
                error
            ),
            error,
        )
    }

    fn fallback(explanation: String, error: String) -> Self {
        Verdict {
            explanation,
            meta: VerdictMeta {
                fallback: true,
                error: Some(error),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Map an already-flattened loose object onto a [`Verdict`].
///
/// Never fails: every field has a typed default. Metadata is left empty for
/// the caller to fill in.
pub fn map_verdict(value: &LooseValue) -> Verdict {
    let covered = value
        .get_any(&["covered", "answer"])
        .and_then(LooseValue::as_text)
        .map(Coverage::from_loose)
        .unwrap_or_default();

    let mut explanation = value
        .get("explanation")
        .map(coerce_explanation)
        .unwrap_or_default();

    if explanation.chars().count() < MIN_EXPLANATION_CHARS {
        let extras: Vec<&str> = value
            .entries()
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
            .filter_map(|(_, v)| v.as_text())
            .filter(|s| s.chars().count() > MIN_SALVAGE_CHARS)
            .collect();
        if !extras.is_empty() {
            explanation = truncate_chars(&extras.join(" "), MAX_EXPLANATION_CHARS);
        }
    }

    Verdict {
        covered,
        confidence: coerce_confidence(value.get("confidence")),
        explanation,
        citations: value
            .get("citations")
            .map(coerce_citations)
            .unwrap_or_default(),
        caveats: value.get("caveats").map(coerce_caveats).unwrap_or_default(),
        meta: VerdictMeta::default(),
    }
}

/// Numbers and numeric strings, clamped to `[0, 1]`; booleans read as
/// `1.0`/`0.0`; anything else is `0.0`.
pub fn coerce_confidence(value: Option<&LooseValue>) -> f64 {
    let raw = match value {
        Some(LooseValue::Scalar(Scalar::Number(n))) => Some(*n),
        Some(LooseValue::Scalar(Scalar::Bool(b))) => Some(f64::from(u8::from(*b))),
        Some(LooseValue::Scalar(Scalar::Text(s))) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(n) if !n.is_nan() => n.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

fn coerce_explanation(value: &LooseValue) -> String {
    match value {
        LooseValue::Sequence(items) => items
            .iter()
            .filter_map(LooseValue::scalar_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        other => other
            .scalar_string()
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Integers, truncated floats, and numeric strings; booleans read as
/// `1`/`0`; anything else is `0`.
pub fn coerce_page(value: Option<&LooseValue>) -> u32 {
    let raw = match value {
        Some(LooseValue::Scalar(Scalar::Number(n))) => Some(n.trunc()),
        Some(LooseValue::Scalar(Scalar::Bool(b))) => Some(f64::from(u8::from(*b))),
        Some(LooseValue::Scalar(Scalar::Text(s))) => {
            let s = s.trim();
            s.parse::<i64>().ok().map(|n| n as f64)
        }
        _ => None,
    };
    match raw {
        Some(n) if n.is_finite() && n >= 0.0 => n.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn text_field(value: &LooseValue, keys: &[&str]) -> String {
    value
        .get_any(keys)
        .and_then(LooseValue::scalar_string)
        .unwrap_or_default()
}

fn coerce_citations(value: &LooseValue) -> Vec<Citation> {
    let LooseValue::Sequence(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| matches!(item, LooseValue::Mapping(_)))
        .map(|item| Citation {
            file: text_field(item, &["file", "filename"]),
            page: coerce_page(item.get_any(&["page", "page_number"])),
            section: text_field(item, &["section", "section_title"]),
            quote: text_field(item, &["quote", "text"]),
        })
        .collect()
}

fn coerce_caveats(value: &LooseValue) -> Vec<String> {
    match value {
        LooseValue::Sequence(items) => items.iter().filter_map(coerce_caveat).collect(),
        LooseValue::Scalar(Scalar::Text(s)) if !s.trim().is_empty() => {
            vec![s.trim().to_string()]
        }
        _ => Vec::new(),
    }
}

fn coerce_caveat(item: &LooseValue) -> Option<String> {
    let text = match item {
        LooseValue::Mapping(entries) => entries
            .iter()
            .filter_map(|(_, v)| v.as_text())
            .find(|s| !s.trim().is_empty())
            .map(str::to_string),
        LooseValue::Sequence(_) => None,
        scalar => scalar.scalar_string(),
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
