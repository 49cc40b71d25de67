//! Page-by-page text extraction.
//!
//! PDFs go through `pdf-extract` page by page; when it cannot handle a file,
//! `lopdf` is tried as a second extractor. Plain-text files are split into
//! pages on form feeds (`\x0c`). Pages that yield no text are kept as empty
//! pages so page numbering stays aligned with the source.

use std::path::Path;

use thiserror::Error;

use coverage_harness_core::models::PageText;

/// Form feed, the conventional page separator in text dumps.
const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extensions [`extract_pages`] understands, lower-case.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract one [`PageText`] per page, numbered from 1.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>, ExtractionError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let pages = match ext.as_str() {
        "pdf" => pdf_pages(&bytes)?,
        "txt" => text_pages(&String::from_utf8_lossy(&bytes)),
        other => return Err(ExtractionError::Unsupported(other.to_string())),
    };

    let total_chars: usize = pages.iter().map(|p| p.char_count).sum();
    let empty = pages.iter().filter(|p| p.char_count == 0).count();
    tracing::info!(
        file = %path.display(),
        pages = pages.len(),
        chars = total_chars,
        empty_pages = empty,
        "extracted pages"
    );
    Ok(pages)
}

fn numbered(texts: impl IntoIterator<Item = String>) -> Vec<PageText> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText::new(i as u32 + 1, text))
        .collect()
}

/// Split a text dump on form feeds.
pub fn text_pages(text: &str) -> Vec<PageText> {
    numbered(text.split(PAGE_BREAK).map(|page| page.to_string()))
}

/// Extract PDF pages from in-memory bytes.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
    match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(texts) => Ok(numbered(texts)),
        Err(e) => {
            tracing::warn!(error = %e, "pdf-extract failed; falling back to lopdf");
            lopdf_pages(bytes)
        }
    }
}

fn lopdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractionError::Pdf("document has no pages".to_string()));
    }
    Ok(numbered(
        page_numbers
            .iter()
            .map(|n| doc.extract_text(&[*n]).unwrap_or_default()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pages_split_on_form_feed() {
        let pages = text_pages("SECTION 1 BENEFITS\nRoom rent.\x0cSECTION 2 EXCLUSIONS\nDental.");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 2);
        assert!(pages[1].text.starts_with("SECTION 2"));
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("policy.PDF")));
        assert!(is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("sheet.xlsx")));
        assert!(!is_supported(Path::new("README")));
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let err = pdf_pages(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.docx");
        std::fs::write(&path, b"PK").unwrap();
        assert!(matches!(
            extract_pages(&path),
            Err(ExtractionError::Unsupported(ext)) if ext == "docx"
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_pages(Path::new("/nonexistent/policy.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/policy.pdf"));
    }
}
