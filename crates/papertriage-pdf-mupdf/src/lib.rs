use std::path::Path;

use mupdf::{Document, TextPageFlags};

use papertriage_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// Kept in its own crate so the AGPL-licensed mupdf dependency stays out of
/// code paths that never open a PDF (tests, alternative backends).
///
/// Each page's text is rebuilt line by line from MuPDF's structured text
/// blocks, in reading order. Pages with no text layer come back as empty
/// strings; deciding what that means is left to the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn page_text(page: &mupdf::Page) -> Result<String, BackendError> {
    let text_page = page
        .to_text_page(TextPageFlags::empty())
        .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

    let mut text = String::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
            text.push('\n');
        }
        // Blank line between blocks keeps paragraphs apart.
        text.push('\n');
    }
    Ok(text)
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages = Vec::new();
        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            pages.push(page_text(&page)?);
        }

        if pages.is_empty() {
            return Err(BackendError::ExtractionError(
                "document has no pages".into(),
            ));
        }
        Ok(pages)
    }
}
