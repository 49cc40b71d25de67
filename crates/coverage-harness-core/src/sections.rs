//! Section header detection.
//!
//! Policy documents rarely carry structural markup once extracted to text,
//! so headers are recognised line by line with three heuristics:
//!
//! | Kind | Example |
//! |------|---------|
//! | [`HeaderKind::Numbered`] | `4.1 Scope of Cover`, `IV. Exclusions`, `B. Claims` |
//! | [`HeaderKind::AllCaps`] | `DEFINITIONS`, `TERMS & CONDITIONS` |
//! | [`HeaderKind::Keyword`] | `Waiting Period for Specific Diseases` |
//!
//! Only lines whose trimmed length is within [`MIN_HEADER_CHARS`] and
//! [`MAX_HEADER_CHARS`] qualify. No hierarchy is inferred.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{PageText, SectionMarker};

pub const MIN_HEADER_CHARS: usize = 4;
pub const MAX_HEADER_CHARS: usize = 120;
/// Stored titles are truncated to this many characters.
pub const MAX_TITLE_CHARS: usize = 100;

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:\.\d{1,3}){0,3}|[IVXLC]+\.|[A-Z]\.)\s+\S")
        .expect("numbered header pattern")
});

static ALL_CAPS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Z][A-Z \-&/,():'"]{3,119}$"#).expect("all-caps header pattern")
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:SECTION|PART|CHAPTER|SCHEDULE|ANNEXURE|APPENDIX|TABLE\s+OF|DEFINITIONS?|EXCLUSIONS?|INCLUSIONS?|BENEFITS?|COVERAGE|GENERAL\s+(?:TERMS|CONDITIONS|PROVISIONS)|CLAIMS?|PREMIUM|WAITING\s+PERIOD|PRE-?EXISTING|RENEWAL|GRIEVANCE|PORTABILITY|FREE\s+LOOK|CANCELLATION)\b",
    )
    .expect("keyword header pattern")
});

/// Which heuristic recognised a header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Numbered,
    AllCaps,
    Keyword,
}

/// Classify a single line. Returns `None` for body text.
pub fn classify_line(line: &str) -> Option<HeaderKind> {
    let line = line.trim();
    let len = line.chars().count();
    if !(MIN_HEADER_CHARS..=MAX_HEADER_CHARS).contains(&len) {
        return None;
    }

    if NUMBERED_RE.is_match(line) {
        return Some(HeaderKind::Numbered);
    }
    if is_all_caps_title(line) {
        return Some(HeaderKind::AllCaps);
    }
    if KEYWORD_RE.is_match(line) {
        return Some(HeaderKind::Keyword);
    }
    None
}

pub fn is_section_header(line: &str) -> bool {
    classify_line(line).is_some()
}

fn is_all_caps_title(line: &str) -> bool {
    let alpha = line.chars().filter(|c| c.is_alphabetic()).count();
    alpha >= 4 && line.to_uppercase() == line && ALL_CAPS_RE.is_match(line)
}

/// Scan every line of every page and record header positions in document order.
pub fn detect_sections(pages: &[PageText]) -> Vec<SectionMarker> {
    let mut sections = Vec::new();
    for page in pages {
        for (line_offset, line) in page.text.lines().enumerate() {
            if is_section_header(line) {
                sections.push(SectionMarker {
                    title: line.trim().chars().take(MAX_TITLE_CHARS).collect(),
                    page_number: page.page_number,
                    line_offset,
                });
            }
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify_line("DEFINITIONS"), Some(HeaderKind::AllCaps));
        assert_eq!(classify_line("4.1 Scope of Cover"), Some(HeaderKind::Numbered));
        assert_eq!(
            classify_line("This is a normal paragraph about coverage."),
            None
        );
        let long_caps = "A".repeat(130);
        assert_eq!(classify_line(&long_caps), None);
    }

    #[test]
    fn test_numbering_variants() {
        assert!(is_section_header("1.2.3.4 Room Rent Limits"));
        assert!(is_section_header("IV. Exclusions"));
        assert!(is_section_header("B. Claim Procedure"));
        assert!(!is_section_header("4.1"));
        assert!(!is_section_header("1234.5 Not a numbered header"));
    }

    #[test]
    fn test_keyword_headers_case_insensitive() {
        assert_eq!(
            classify_line("Waiting period for specific diseases"),
            Some(HeaderKind::Keyword)
        );
        assert_eq!(
            classify_line("pre-existing diseases"),
            Some(HeaderKind::Keyword)
        );
        assert_eq!(
            classify_line("General Terms and Clauses"),
            Some(HeaderKind::Keyword)
        );
        // Keyword must be a whole word at the start of the line.
        assert_eq!(classify_line("Partially reimbursed expenses"), None);
    }

    #[test]
    fn test_all_caps_needs_letters() {
        assert!(is_section_header("TERMS & CONDITIONS"));
        assert!(!is_section_header("A-1 / B-2"));
        assert!(!is_section_header("ABC"));
    }

    #[test]
    fn test_detect_sections_positions() {
        let pages = vec![
            PageText::new(1, "POLICY WORDING\nSome introductory text here."),
            PageText::empty(2),
            PageText::new(3, "body line\n  3.1 Hospitalisation Expenses  \nmore body"),
        ];
        let sections = detect_sections(&pages);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "POLICY WORDING");
        assert_eq!(sections[0].page_number, 1);
        assert_eq!(sections[0].line_offset, 0);
        assert_eq!(sections[1].title, "3.1 Hospitalisation Expenses");
        assert_eq!(sections[1].page_number, 3);
        assert_eq!(sections[1].line_offset, 1);
    }

    #[test]
    fn test_title_truncated() {
        let line = format!("SECTION {}", "x".repeat(110));
        let pages = vec![PageText::new(1, line)];
        let sections = detect_sections(&pages);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title.chars().count(), MAX_TITLE_CHARS);
    }
}
