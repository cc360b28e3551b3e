//! The append-only destination for analysis records.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::record::AnalysisRecord;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// An existing store has a first row that is not the expected header.
    #[error("existing header does not match expected columns (found: {found:?})")]
    HeaderMismatch { found: Vec<String> },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Network(String),
    /// The remote service or the encoder refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A tabular store receiving one row per analyzed paper.
///
/// Implementations must have written the row durably before the returned
/// future resolves; the orchestrator relocates the source file right after.
pub trait RecordSink: Send + Sync {
    /// Sink kind for logs (e.g. "CSV", "Google Sheets").
    fn name(&self) -> &str;

    /// Human-readable location of the store (file path or sheet URL).
    fn location(&self) -> String;

    /// Append one record.
    fn append<'a>(
        &'a self,
        record: &'a AnalysisRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}
