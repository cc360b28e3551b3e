//! Completion backend trait and implementations for generative-AI providers.

pub mod gemini;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use gemini::GeminiBackend;

/// Errors from a single completion call.
#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Network(String),
    /// Server returned 429 (rate limited or out of quota).
    #[error("quota exhausted or rate limited (429){}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    /// Server returned 401/403.
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// The provider answered but returned no usable text.
    #[error("empty completion: {0}")]
    Empty(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {:.1}s", d.as_secs_f64()))
        .unwrap_or_default()
}

/// A text-completion capability: prompt in, generated text out.
pub trait CompletionBackend: Send + Sync {
    /// Provider name used in logs (e.g. "Gemini").
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Run one completion for `prompt`.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
}
