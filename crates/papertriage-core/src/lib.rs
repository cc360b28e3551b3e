//! Automated triage of research papers: PDFs dropped into an inbox folder are
//! summarized by a language model and recorded in a tabular store.

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod config_file;
pub mod extract;
pub mod llm;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod watch;

// Re-export for convenience
pub use analyzer::{AnalysisError, Analyzer, AnalyzerSettings};
pub use backend::{BackendError, PdfBackend};
pub use config::{ConfigError, Settings, SinkSettings};
pub use extract::{ExtractError, ExtractedText, TextExtractor};
pub use llm::{CompletionBackend, CompletionError, GeminiBackend};
pub use pipeline::{
    Directories, Failure, FailureKind, PaperFile, PaperStatus, Pipeline, PipelineError,
    ProcessOutcome,
};
pub use record::{AnalysisRecord, RecommendedAction, RelevanceScore, ResearchArea, SINK_HEADERS};
pub use sink::{RecordSink, SinkError};
pub use watch::{InboxWatcher, RunSummary, WatchError};
