//! Plain-text extraction on top of a [`PdfBackend`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{BackendError, PdfBackend};

/// Text pulled out of a single paper, ready for analysis.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub source: PathBuf,
    /// Page texts joined by a blank line, trimmed. Never empty.
    pub text: String,
    pub page_count: usize,
}

impl ExtractedText {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Failed(#[from] BackendError),
    #[error("no text layer found (scanned or image-only PDF?)")]
    NoText,
}

/// Extracts the full text of a PDF and rejects documents without a text layer.
#[derive(Clone)]
pub struct TextExtractor {
    backend: Arc<dyn PdfBackend>,
}

impl TextExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    /// Extract and join the text of every page.
    ///
    /// Returns [`ExtractError::NoText`] rather than an empty success when the
    /// document only contains whitespace, so an empty prompt never reaches the
    /// analyzer.
    pub fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        let pages = self.backend.extract_pages(path)?;
        let text = join_pages(&pages);

        if text.is_empty() {
            tracing::warn!(
                file = %display_name(path),
                pages = pages.len(),
                "no text extracted, might be a scanned or image-based PDF"
            );
            return Err(ExtractError::NoText);
        }

        let extracted = ExtractedText {
            source: path.to_path_buf(),
            text,
            page_count: pages.len(),
        };
        tracing::info!(
            file = %display_name(path),
            pages = extracted.page_count,
            words = extracted.word_count(),
            "extracted text"
        );
        Ok(extracted)
    }

    /// Run [`extract`](Self::extract) on the blocking thread pool.
    pub async fn extract_blocking(&self, path: PathBuf) -> Result<ExtractedText, ExtractError> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .unwrap_or_else(|e| {
                Err(ExtractError::Failed(BackendError::ExtractionError(
                    format!("extraction task failed: {}", e),
                )))
            })
    }
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockExtractor, MockPages};

    fn extractor(pages: MockPages) -> TextExtractor {
        TextExtractor::new(Arc::new(MockExtractor::new(pages)))
    }

    #[test]
    fn pages_joined_in_order() {
        let ex = extractor(MockPages::Text(vec![
            "  First page\n".into(),
            "Second page  ".into(),
            "Third page".into(),
        ]));
        let out = ex.extract(Path::new("paper.pdf")).unwrap();
        assert_eq!(out.text, "First page\n\nSecond page\n\nThird page");
        assert_eq!(out.page_count, 3);
        assert_eq!(out.word_count(), 6);
    }

    #[test]
    fn blank_pages_are_skipped_but_counted() {
        let ex = extractor(MockPages::Text(vec![
            "Title".into(),
            "   \n\t".into(),
            "Body".into(),
        ]));
        let out = ex.extract(Path::new("paper.pdf")).unwrap();
        assert_eq!(out.text, "Title\n\nBody");
        assert_eq!(out.page_count, 3);
    }

    #[test]
    fn whitespace_only_is_no_text() {
        let ex = extractor(MockPages::Text(vec![" \n ".into(), String::new()]));
        let err = ex.extract(Path::new("scan.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::NoText));
    }

    #[test]
    fn zero_pages_is_no_text() {
        let ex = extractor(MockPages::Text(vec![]));
        assert!(matches!(
            ex.extract(Path::new("empty.pdf")),
            Err(ExtractError::NoText)
        ));
    }

    #[test]
    fn backend_error_is_extraction_failure() {
        let ex = extractor(MockPages::Error("corrupt xref".into()));
        let err = ex.extract(Path::new("broken.pdf")).unwrap_err();
        match err {
            ExtractError::Failed(e) => assert!(e.to_string().contains("corrupt xref")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocking_variant_matches_sync() {
        let ex = extractor(MockPages::Text(vec!["Hello".into()]));
        let out = ex.extract_blocking(PathBuf::from("a.pdf")).await.unwrap();
        assert_eq!(out.text, "Hello");
        assert_eq!(out.source, PathBuf::from("a.pdf"));
    }
}
