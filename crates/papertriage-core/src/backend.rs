use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to read page text: {0}")]
    ExtractionError(String),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return the raw text of every page in page order. Trimming and
/// the empty-text check live in [`crate::extract::TextExtractor`] so every
/// backend gets the same `NoTextExtracted` behavior.
pub trait PdfBackend: Send + Sync {
    /// Extract the text of each page of a PDF file, first page first.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError>;
}
