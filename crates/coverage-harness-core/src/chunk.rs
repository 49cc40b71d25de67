//! Sentence-aligned, token-bounded chunker with overlap.
//!
//! Splits a document's page text into [`Chunk`]s that never cut a sentence
//! and stay within a token budget.
//!
//! # Algorithm
//!
//! 1. Join pages with `\n` and split into sentences ([`split_sentences`]).
//! 2. Greedily accumulate sentences while the running token total stays at
//!    or under `target_tokens`. A sentence that alone exceeds the budget
//!    becomes its own chunk.
//! 3. After closing a chunk, rewind over its trailing sentences so the next
//!    chunk repeats its last sentence plus up to `overlap_tokens` tokens of
//!    earlier context. The rewind never reaches the closed chunk's first
//!    sentence and never crowds out the next unseen sentence, so every chunk
//!    makes forward progress.
//! 4. A chunk's `token_count` is the sum of its sentences' counts, the same
//!    figure the budget was checked against.
//! 5. Offsets come from cumulative sentence lengths (each sentence counts
//!    its length plus one separator). Offsets are mapped through the page
//!    table to a page range, and through the section table to the last
//!    header at or before the chunk start.
//!
//! Offsets are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use coverage_harness_core::chunk::{chunk_document, ChunkOptions};
//! use coverage_harness_core::models::PageText;
//! use coverage_harness_core::tokens::WhitespaceCounter;
//!
//! let pages = vec![PageText::new(1, "Room rent is covered. ICU charges are covered.")];
//! let chunks = chunk_document("policy.pdf", &pages, &[], &WhitespaceCounter, &ChunkOptions::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_id, "policy__chunk_0001");
//! assert_eq!(chunks[0].section_title, "Unknown");
//! ```

use std::ops::Range;
use std::path::Path;

use crate::models::{Chunk, PageText, SectionMarker};
use crate::sections::detect_sections;
use crate::tokens::TokenCounter;

/// Section title used when no header precedes a chunk.
pub const UNKNOWN_SECTION: &str = "Unknown";

/// Chunk size and overlap budgets, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_tokens: 800,
            overlap_tokens: 100,
        }
    }
}

/// Split text into trimmed, non-empty sentences.
///
/// A boundary follows one of `. ! ? ;` when whitespace and then an
/// upper-case ASCII letter, a digit, or `(` comes next. Every line break
/// followed by more text is also a boundary. Falls back to raw newline
/// splitting, then to the whole text.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut seg_start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let terminal = matches!(c, '.' | '!' | '?' | ';');
        if terminal || c == '\n' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if let Some(&(next_pos, next)) = chars.get(j) {
                let boundary = c == '\n'
                    || (j > i + 1
                        && (next.is_ascii_uppercase() || next.is_ascii_digit() || next == '('));
                if boundary {
                    push_trimmed(&mut sentences, &text[seg_start..pos + c.len_utf8()]);
                    seg_start = next_pos;
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }
    push_trimmed(&mut sentences, &text[seg_start..]);

    if sentences.is_empty() {
        for line in text.split('\n') {
            push_trimmed(&mut sentences, line);
        }
    }
    if sentences.is_empty() && !text.is_empty() {
        sentences.push(text.to_string());
    }
    sentences
}

fn push_trimmed(out: &mut Vec<String>, segment: &str) {
    let segment = segment.trim();
    if !segment.is_empty() {
        out.push(segment.to_string());
    }
}

/// Plan chunk windows over per-sentence token counts.
///
/// Returns half-open sentence ranges in document order. Every sentence is
/// covered, each range starts strictly after the previous one, and each
/// range ends strictly after the previous one.
pub fn plan_windows(tokens: &[usize], options: &ChunkOptions) -> Vec<Range<usize>> {
    let n = tokens.len();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < n {
        let mut end = start;
        let mut total = 0;
        while end < n {
            if total + tokens[end] > options.target_tokens && end > start {
                break;
            }
            total += tokens[end];
            end += 1;
            if total > options.target_tokens {
                // A single oversized sentence forms its own chunk.
                break;
            }
        }
        windows.push(start..end);

        if end >= n {
            break;
        }

        start = rewind(tokens, start..end, options);
    }

    windows
}

/// First sentence of the window following `closed`.
///
/// With a non-zero overlap budget the closed window's last sentence is
/// always repeated, and earlier sentences join it while the rewound total
/// stays within the budget. Nothing is rewound when the closed window holds
/// a single sentence, or when the repeated sentences would leave no room for
/// the next unseen one.
fn rewind(tokens: &[usize], closed: Range<usize>, options: &ChunkOptions) -> usize {
    let next = tokens[closed.end];
    let mut rewound = 0;
    let mut cursor = closed.end;
    while cursor > closed.start + 1 {
        let t = tokens[cursor - 1];
        let first = cursor == closed.end;
        if options.overlap_tokens == 0
            || (!first && rewound + t > options.overlap_tokens)
            || rewound + t + next > options.target_tokens
        {
            break;
        }
        rewound += t;
        cursor -= 1;
    }
    cursor
}

/// Document stem used as the chunk id prefix.
pub fn document_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// Monotonic table of `(page_number, char_offset)` for the `\n`-joined pages.
fn page_table(pages: &[PageText]) -> Vec<(u32, usize)> {
    let mut table = Vec::with_capacity(pages.len());
    let mut offset = 0;
    for page in pages {
        table.push((page.page_number, offset));
        offset += page.char_count + 1;
    }
    table
}

fn page_at(table: &[(u32, usize)], offset: usize) -> u32 {
    table
        .iter()
        .take_while(|(_, start)| *start <= offset)
        .last()
        .or_else(|| table.first())
        .map(|(page, _)| *page)
        .unwrap_or(1)
}

/// Estimated `(char_offset, title)` for each header, in document order.
///
/// The estimate sums line lengths on the header's page, so it drifts when
/// the extracted line breaks do not match the page layout.
fn section_table<'a>(
    pages: &[PageText],
    table: &[(u32, usize)],
    sections: &'a [SectionMarker],
) -> Vec<(usize, &'a str)> {
    let mut out: Vec<(usize, &str)> = sections
        .iter()
        .filter_map(|section| {
            let (idx, (_, page_start)) = table
                .iter()
                .enumerate()
                .find(|(_, (page, _))| *page == section.page_number)?;
            let within: usize = pages[idx]
                .text
                .lines()
                .take(section.line_offset)
                .map(|line| line.chars().count() + 1)
                .sum();
            Some((page_start + within, section.title.as_str()))
        })
        .collect();
    out.sort_by_key(|(offset, _)| *offset);
    out
}

fn section_at<'a>(table: &[(usize, &'a str)], offset: usize) -> &'a str {
    table
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .map(|(_, title)| *title)
        .unwrap_or(UNKNOWN_SECTION)
}

/// Assemble chunks for one document.
///
/// Whitespace-only documents produce no chunks.
pub fn chunk_document(
    filename: &str,
    pages: &[PageText],
    sections: &[SectionMarker],
    counter: &dyn TokenCounter,
    options: &ChunkOptions,
) -> Vec<Chunk> {
    let full_text = pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if full_text.trim().is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&full_text);
    let tokens: Vec<usize> = sentences.iter().map(|s| counter.count(s)).collect();

    let mut starts = Vec::with_capacity(sentences.len());
    let mut offset = 0;
    for sentence in &sentences {
        starts.push(offset);
        offset += sentence.chars().count() + 1;
    }

    let pages_by_offset = page_table(pages);
    let sections_by_offset = section_table(pages, &pages_by_offset, sections);
    let stem = document_stem(filename);

    plan_windows(&tokens, options)
        .into_iter()
        .enumerate()
        .map(|(idx, window)| {
            let text = sentences[window.clone()].join(" ");
            let char_start = starts[window.start];
            let char_end = char_start + text.chars().count();
            Chunk {
                chunk_id: format!("{}__chunk_{:04}", stem, idx + 1),
                token_count: tokens[window.clone()].iter().sum(),
                filename: filename.to_string(),
                page_number: page_at(&pages_by_offset, char_start),
                page_end: page_at(&pages_by_offset, char_end),
                section_title: section_at(&sections_by_offset, char_start).to_string(),
                char_start,
                char_end,
                text,
            }
        })
        .collect()
}

/// Detect sections and chunk in one step.
pub fn segment_document(
    filename: &str,
    pages: &[PageText],
    counter: &dyn TokenCounter,
    options: &ChunkOptions,
) -> Vec<Chunk> {
    let sections = detect_sections(pages);
    chunk_document(filename, pages, &sections, counter, options)
}
