use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};

use super::{CompletionBackend, CompletionError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Low temperature keeps the JSON output stable between runs.
const TEMPERATURE: f64 = 0.2;

/// Google Gemini `generateContent` client.
pub struct GeminiBackend {
    api_key: String,
    model: String,
    max_output_tokens: u32,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_output_tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point the client at a different API root (proxies, regional endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

/// Request body for a single-turn text prompt.
pub fn request_body(prompt: &str, max_output_tokens: u32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "maxOutputTokens": max_output_tokens,
            "temperature": TEMPERATURE,
            "responseMimeType": "application/json"
        }
    })
}

/// Pull the generated text out of a `generateContent` response.
///
/// Text parts of the first candidate are concatenated. A response without
/// candidates (e.g. a blocked prompt) or without text is an error.
pub fn response_text(data: &Value) -> Result<String, CompletionError> {
    let Some(candidate) = data["candidates"].as_array().and_then(|c| c.first()) else {
        let reason = data["promptFeedback"]["blockReason"]
            .as_str()
            .map(|r| format!("prompt blocked: {}", r))
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(CompletionError::Empty(reason));
    };

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let finish = candidate["finishReason"].as_str().unwrap_or("UNKNOWN");
        return Err(CompletionError::Empty(format!(
            "candidate has no text (finishReason: {})",
            finish
        )));
    }

    Ok(text)
}

/// Best-effort extraction of the error message from a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(300).collect())
}

impl CompletionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .timeout(self.timeout)
                .json(&request_body(prompt, self.max_output_tokens))
                .send()
                .await
                .map_err(|e| CompletionError::Network(e.to_string()))?;

            let status = resp.status();
            if status.as_u16() == 429 {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(CompletionError::RateLimited { retry_after });
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let message = error_message(&body);
                return Err(match status.as_u16() {
                    401 | 403 => CompletionError::Auth {
                        status: status.as_u16(),
                        message,
                    },
                    code => CompletionError::Http {
                        status: code,
                        message,
                    },
                });
            }

            let data: Value = resp
                .json()
                .await
                .map_err(|e| CompletionError::Network(e.to_string()))?;
            response_text(&data)
        })
    }
}
