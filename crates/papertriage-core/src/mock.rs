//! Hand-rolled backends for tests: a scripted completion backend, a PDF
//! backend that returns canned pages, and an in-memory sink.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::backend::{BackendError, PdfBackend};
use crate::llm::{CompletionBackend, CompletionError};
use crate::record::AnalysisRecord;
use crate::sink::{RecordSink, SinkError};

/// A completion backend replaying scripted responses.
///
/// Supports a fixed response for every call or a sequence (one per call, the
/// last repeated once exhausted), and records every prompt it receives.
pub struct MockCompletion {
    responses: Mutex<Vec<Result<String, CompletionError>>>,
    fallback: Result<String, CompletionError>,
    prompts: Mutex<Vec<String>>,
    call_count: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockCompletion {
    /// Create a mock that always returns `response`.
    pub fn new(response: Result<String, CompletionError>) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: response,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Hold every response until `gate` is notified once per call.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<Result<String, CompletionError>>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        responses.reverse();
        let fallback = responses[0].clone();
        Self {
            responses: Mutex::new(responses),
            fallback,
            prompts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    fn next_response(&self) -> Result<String, CompletionError> {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl CompletionBackend for MockCompletion {
    fn name(&self) -> &str {
        "Mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let response = self.next_response();
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            response
        })
    }
}

/// Canned extraction result for [`MockExtractor`].
#[derive(Debug, Clone)]
pub enum MockPages {
    Text(Vec<String>),
    Error(String),
}

/// A PDF backend returning canned pages, optionally keyed by file name.
pub struct MockExtractor {
    default: MockPages,
    by_name: HashMap<String, MockPages>,
}

impl MockExtractor {
    pub fn new(default: MockPages) -> Self {
        Self {
            default,
            by_name: HashMap::new(),
        }
    }

    /// Return `pages` for files named `file_name`.
    pub fn with_file(mut self, file_name: &str, pages: MockPages) -> Self {
        self.by_name.insert(file_name.to_string(), pages);
        self
    }
}

impl PdfBackend for MockExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match self.by_name.get(&name).unwrap_or(&self.default) {
            MockPages::Text(pages) => Ok(pages.clone()),
            MockPages::Error(msg) => Err(BackendError::OpenError(msg.clone())),
        }
    }
}

/// An in-memory sink. Optionally fails every append with a fixed message.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AnalysisRecord>>,
    fail_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "Memory"
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn append<'a>(
        &'a self,
        record: &'a AnalysisRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(ref msg) = self.fail_with {
                return Err(SinkError::Rejected(msg.clone()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        })
    }
}
