//! The per-file pipeline: extract → analyze → persist → relocate.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::analyzer::{AnalysisError, Analyzer};
use crate::extract::{ExtractError, TextExtractor, display_name};
use crate::record::AnalysisRecord;
use crate::sink::{RecordSink, SinkError};

/// Processing status of a single paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperStatus {
    Pending,
    Extracting,
    Analyzing,
    Persisting,
    Persisted,
    Failed,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Pending => "pending",
            PaperStatus::Extracting => "extracting",
            PaperStatus::Analyzing => "analyzing",
            PaperStatus::Persisting => "persisting",
            PaperStatus::Persisted => "persisted",
            PaperStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperStatus::Persisted | PaperStatus::Failed)
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PDF observed in the inbox and its progress through the pipeline.
#[derive(Debug, Clone)]
pub struct PaperFile {
    pub path: PathBuf,
    pub arrived_at: DateTime<Local>,
    pub status: PaperStatus,
}

impl PaperFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            arrived_at: Local::now(),
            status: PaperStatus::Pending,
        }
    }

    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }

    fn advance(&mut self, next: PaperStatus) {
        tracing::debug!(
            file = %self.file_name(),
            from = %self.status,
            to = %next,
            "stage transition"
        );
        self.status = next;
    }
}

/// Error taxonomy tag for a failed paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ExtractionFailed,
    NoTextExtracted,
    AnalysisCallFailed,
    AnalysisParseFailed,
    SinkWriteFailed,
    /// The row was written but the file could not be moved to processed.
    RelocationFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExtractionFailed => "ExtractionFailed",
            FailureKind::NoTextExtracted => "NoTextExtracted",
            FailureKind::AnalysisCallFailed => "AnalysisCallFailed",
            FailureKind::AnalysisParseFailed => "AnalysisParseFailed",
            FailureKind::SinkWriteFailed => "SinkWriteFailed",
            FailureKind::RelocationFailed => "RelocationFailed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any per-file error. None of these stop the watcher.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Extract(ExtractError::Failed(_)) => FailureKind::ExtractionFailed,
            PipelineError::Extract(ExtractError::NoText) => FailureKind::NoTextExtracted,
            PipelineError::Analysis(AnalysisError::Call(_)) => FailureKind::AnalysisCallFailed,
            PipelineError::Analysis(AnalysisError::Parse { .. }) => {
                FailureKind::AnalysisParseFailed
            }
            PipelineError::Sink(_) => FailureKind::SinkWriteFailed,
        }
    }
}

/// Why a paper ended up in the failed directory.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    /// Status the paper was in when the error happened.
    pub stage: PaperStatus,
    pub message: String,
}

/// Result of running the pipeline on one file.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub paper: PaperFile,
    pub record: Option<AnalysisRecord>,
    pub failure: Option<Failure>,
    /// Where the file was moved. `None` if the move itself failed.
    pub destination: Option<PathBuf>,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.paper.status == PaperStatus::Persisted
    }
}

/// Inbox and holding directories.
#[derive(Debug, Clone)]
pub struct Directories {
    pub inbox: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
}

impl Directories {
    /// Create all three directories if missing.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.inbox, &self.processed, &self.failed] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Pick a free name for `file_name` inside `dir`: the name itself, or
/// `<stem>_<n>.<ext>` with the smallest free `n`.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1usize;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move `src` into `dir` without overwriting anything there.
///
/// Tries a rename first and falls back to copy + remove (e.g. across
/// filesystems). Returns the final path.
pub fn move_into(src: &Path, dir: &Path) -> io::Result<PathBuf> {
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let dest = unique_destination(dir, &name);

    if let Err(rename_err) = std::fs::rename(src, &dest) {
        if !src.exists() {
            return Err(rename_err);
        }
        std::fs::copy(src, &dest)?;
        if let Err(e) = std::fs::remove_file(src) {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }
    }
    Ok(dest)
}

/// Runs papers through extraction, analysis and persistence, then moves them
/// to the processed or failed directory.
#[derive(Clone)]
pub struct Pipeline {
    extractor: TextExtractor,
    analyzer: Analyzer,
    sink: Arc<dyn RecordSink>,
    dirs: Directories,
}

impl Pipeline {
    pub fn new(
        extractor: TextExtractor,
        analyzer: Analyzer,
        sink: Arc<dyn RecordSink>,
        dirs: Directories,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            sink,
            dirs,
        }
    }

    pub fn directories(&self) -> &Directories {
        &self.dirs
    }

    /// Process one file to a terminal state. Never panics on per-file errors;
    /// failures are logged and reported in the outcome.
    pub async fn process(&self, path: &Path) -> ProcessOutcome {
        let mut paper = PaperFile::new(path);
        let file = paper.file_name();
        tracing::info!(file = %file, "processing new paper");

        match self.run_stages(&mut paper).await {
            Ok(record) => match move_into(&paper.path, &self.dirs.processed) {
                Ok(dest) => {
                    tracing::info!(file = %file, to = %dest.display(), "moved paper");
                    paper.advance(PaperStatus::Persisted);
                    tracing::info!(
                        file = %file,
                        title = %record.title,
                        score = record.relevance_score.get(),
                        action = %record.recommended_action,
                        "successfully processed"
                    );
                    ProcessOutcome {
                        paper,
                        record: Some(record),
                        failure: None,
                        destination: Some(dest),
                    }
                }
                Err(e) => {
                    let stage = paper.status;
                    tracing::error!(
                        file = %file,
                        to = %self.dirs.processed.display(),
                        kind = %FailureKind::RelocationFailed,
                        error = %e,
                        "row written but paper could not be moved to processed"
                    );
                    let destination = self.relocate(&paper, &self.dirs.failed);
                    paper.advance(PaperStatus::Failed);
                    ProcessOutcome {
                        paper,
                        record: Some(record),
                        failure: Some(Failure {
                            kind: FailureKind::RelocationFailed,
                            stage,
                            message: format!(
                                "failed to move to {}: {}",
                                self.dirs.processed.display(),
                                e
                            ),
                        }),
                        destination,
                    }
                }
            },
            Err(err) => {
                let stage = paper.status;
                let kind = err.kind();
                tracing::error!(
                    file = %file,
                    stage = %stage,
                    kind = %kind,
                    error = %err,
                    "failed to process paper"
                );
                if let PipelineError::Analysis(AnalysisError::Parse { ref raw, .. }) = err {
                    tracing::debug!(file = %file, response = %raw, "unparseable model response");
                }
                let destination = self.relocate(&paper, &self.dirs.failed);
                paper.advance(PaperStatus::Failed);
                ProcessOutcome {
                    paper,
                    record: None,
                    failure: Some(Failure {
                        kind,
                        stage,
                        message: err.to_string(),
                    }),
                    destination,
                }
            }
        }
    }

    async fn run_stages(&self, paper: &mut PaperFile) -> Result<AnalysisRecord, PipelineError> {
        paper.advance(PaperStatus::Extracting);
        let extracted = self.extractor.extract_blocking(paper.path.clone()).await?;

        paper.advance(PaperStatus::Analyzing);
        let record = self
            .analyzer
            .analyze(&extracted.text, &paper.file_name())
            .await?;

        paper.advance(PaperStatus::Persisting);
        self.sink.append(&record).await?;
        Ok(record)
    }

    fn relocate(&self, paper: &PaperFile, dir: &Path) -> Option<PathBuf> {
        match move_into(&paper.path, dir) {
            Ok(dest) => {
                tracing::info!(file = %paper.file_name(), to = %dest.display(), "moved paper");
                Some(dest)
            }
            Err(e) => {
                tracing::error!(
                    file = %paper.file_name(),
                    to = %dir.display(),
                    error = %e,
                    "failed to move paper out of the inbox"
                );
                None
            }
        }
    }
}
