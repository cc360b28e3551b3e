//! Structured paper analysis: prompt construction, the completion call, and
//! validation of the returned JSON into an [`AnalysisRecord`].

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::{CompletionBackend, CompletionError};
use crate::record::{AnalysisRecord, RecommendedAction, RelevanceScore, ResearchArea};

pub const DEFAULT_MAX_INPUT_CHARS: usize = 100_000;
pub const DEFAULT_RELEVANCE_DOMAIN: &str = "data systems optimization";
pub const TRUNCATION_MARKER: &str = "\n\n[... Text truncated due to length ...]";

/// Values the model uses to say "nothing reported".
const NOT_SPECIFIED: [&str; 4] = ["n/a", "na", "not specified", "none"];

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{0}")]
    Call(#[from] CompletionError),
    /// The response was not valid JSON or violated the record schema.
    /// `raw` keeps the full model output for diagnosis.
    #[error("{reason}")]
    Parse { reason: String, raw: String },
}

impl AnalysisError {
    fn parse(reason: impl Into<String>, raw: &str) -> Self {
        AnalysisError::Parse {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Prompt parameters for the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// Character budget for the paper text embedded in the prompt.
    pub max_input_chars: usize,
    /// Domain the relevance score is measured against.
    pub relevance_domain: String,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            relevance_domain: DEFAULT_RELEVANCE_DOMAIN.to_string(),
        }
    }
}

/// Sends paper text to a [`CompletionBackend`] and validates the answer.
#[derive(Clone)]
pub struct Analyzer {
    backend: Arc<dyn CompletionBackend>,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: AnalyzerSettings) -> Self {
        Self { backend, settings }
    }

    /// Analyze one paper. Exactly one completion call is made; nothing is
    /// retried here.
    pub async fn analyze(&self, text: &str, filename: &str) -> Result<AnalysisRecord, AnalysisError> {
        let body = truncate_text(text, self.settings.max_input_chars);
        if let Cow::Owned(_) = body {
            tracing::warn!(
                file = filename,
                chars = text.chars().count(),
                limit = self.settings.max_input_chars,
                "paper text truncated"
            );
        }
        let prompt = build_prompt(&body, filename, &self.settings.relevance_domain);

        tracing::info!(
            file = filename,
            provider = self.backend.name(),
            model = self.backend.model(),
            "sending paper for analysis"
        );
        let raw = self.backend.complete(&prompt).await?;
        tracing::debug!(file = filename, response = %raw, "model response");

        let record = parse_response(&raw, filename, Local::now())?;
        tracing::info!(file = filename, title = %record.title, "analysis complete");
        Ok(record)
    }
}

/// Cut `text` to at most `max_chars` characters, appending a marker when
/// anything was dropped.
pub fn truncate_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(format!("{}{}", &text[..idx], TRUNCATION_MARKER)),
        None => Cow::Borrowed(text),
    }
}

/// Build the fixed analysis prompt.
pub fn build_prompt(text: &str, filename: &str, relevance_domain: &str) -> String {
    let areas = ResearchArea::ALL
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let actions = RecommendedAction::ALL
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert research paper analyst. You assess papers for a reader interested in {domain}.

Analyze the following research paper and extract structured information. Return your analysis ONLY as a valid JSON object, with no additional text before or after.

Filename: {filename}

Research Paper Text:
{text}

Provide your analysis in the following JSON format:
{{
  "title": "The full title of the paper",
  "authors": ["First Author", "Second Author"],
  "research_area": "One of: {areas}",
  "relevance_score": 8,
  "key_findings": "2-3 sentences summarizing the main findings",
  "methodology": "Brief description of the research methodology",
  "performance_metrics": "Any benchmarks, speedups, or performance improvements mentioned",
  "recommended_action": "One of: {actions}"
}}

Guidelines:
- relevance_score: an integer from 1 to 10 rating relevance to {domain} research
- research_area: choose the most appropriate category from the list, or "Other" if none fits
- recommended_action:
  * "Deep Read" for highly relevant papers (score 8-10)
  * "Skim" for moderately relevant papers (score 4-7)
  * "Archive" for low relevance papers (score 1-3)
- performance_metrics: use "N/A" if the paper reports none
- If the title or authors cannot be determined, use "Not specified"

Return ONLY the JSON object, no additional commentary."#,
        domain = relevance_domain,
        filename = filename,
        text = text,
        areas = areas,
        actions = actions,
    )
}

/// Slice out the JSON object in a model response, tolerating prose or code
/// fences around it.
fn json_object_slice(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parse and validate a model response into an [`AnalysisRecord`].
pub fn parse_response(
    raw: &str,
    filename: &str,
    timestamp: DateTime<Local>,
) -> Result<AnalysisRecord, AnalysisError> {
    let obj: Map<String, Value> = serde_json::from_str(json_object_slice(raw))
        .map_err(|e| AnalysisError::parse(format!("response is not a JSON object: {}", e), raw))?;

    let field = |name: &str| -> Result<&Value, AnalysisError> {
        match obj.get(name) {
            None | Some(Value::Null) => Err(AnalysisError::parse(
                format!("missing required field `{}`", name),
                raw,
            )),
            Some(v) => Ok(v),
        }
    };
    let string_field = |name: &str| -> Result<String, AnalysisError> {
        match field(name)? {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Value::String(_) => Err(AnalysisError::parse(format!("field `{}` is empty", name), raw)),
            other => Err(AnalysisError::parse(
                format!("field `{}` must be a string, got {}", name, other),
                raw,
            )),
        }
    };

    let title = string_field("title")?;
    let authors = parse_authors(field("authors")?).map_err(|r| AnalysisError::parse(r, raw))?;
    let research_area = ResearchArea::from_label(&string_field("research_area")?);
    let relevance_score =
        parse_score(field("relevance_score")?).map_err(|r| AnalysisError::parse(r, raw))?;
    let key_findings = string_field("key_findings")?;
    let methodology = string_field("methodology")?;
    let performance_metrics = parse_metrics(obj.get("performance_metrics"))
        .map_err(|r| AnalysisError::parse(r, raw))?;

    let action_label = string_field("recommended_action")?;
    let recommended_action = RecommendedAction::parse(&action_label).ok_or_else(|| {
        AnalysisError::parse(
            format!("unrecognized recommended_action `{}`", action_label),
            raw,
        )
    })?;

    Ok(AnalysisRecord {
        timestamp,
        filename: filename.to_string(),
        title,
        authors,
        research_area,
        relevance_score,
        key_findings,
        methodology,
        performance_metrics,
        recommended_action,
    })
}

fn parse_authors(value: &Value) -> Result<Vec<String>, String> {
    let names: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| format!("author entry must be a string, got {}", item))
            })
            .collect::<Result<_, _>>()?,
        Value::String(s) => s.split([',', ';']).map(|a| a.trim().to_string()).collect(),
        other => return Err(format!("field `authors` must be a list or string, got {}", other)),
    };
    let names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return Err("field `authors` is empty".to_string());
    }
    Ok(names)
}

fn parse_score(value: &Value) -> Result<RelevanceScore, String> {
    let n = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("relevance_score must be an integer, got {}", n))?,
        other => return Err(format!("relevance_score must be an integer, got {}", other)),
    };
    RelevanceScore::new(n).ok_or_else(|| {
        format!(
            "relevance_score {} outside {}..={}",
            n,
            RelevanceScore::MIN,
            RelevanceScore::MAX
        )
    })
}

fn parse_metrics(value: Option<&Value>) -> Result<Option<String>, String> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => {
            return Err(format!(
                "field `performance_metrics` must be a string, got {}",
                other
            ));
        }
    };
    if text.is_empty() || NOT_SPECIFIED.contains(&text.to_ascii_lowercase().as_str()) {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCompletion;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "title": "Attention Is All You Need",
            "authors": ["Ashish Vaswani", "Noam Shazeer"],
            "research_area": "LLMs",
            "relevance_score": 7,
            "key_findings": "The Transformer outperforms recurrent models.",
            "methodology": "Attention-only encoder-decoder.",
            "performance_metrics": "28.4 BLEU on WMT 2014 En-De",
            "recommended_action": "Skim"
        })
    }

    fn parse(v: &Value) -> Result<AnalysisRecord, AnalysisError> {
        parse_response(&v.to_string(), "paper.pdf", Local::now())
    }

    fn assert_parse_failure(v: &Value, needle: &str) {
        match parse(v) {
            Err(AnalysisError::Parse { reason, raw }) => {
                assert!(reason.contains(needle), "reason `{reason}` lacks `{needle}`");
                assert_eq!(raw, v.to_string());
            }
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[test]
    fn valid_response_parses() {
        let rec = parse(&valid()).unwrap();
        assert_eq!(rec.title, "Attention Is All You Need");
        assert_eq!(rec.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(rec.research_area, ResearchArea::Llms);
        assert_eq!(rec.relevance_score.get(), 7);
        assert_eq!(rec.recommended_action, RecommendedAction::Skim);
        assert_eq!(rec.filename, "paper.pdf");
        assert_eq!(
            rec.performance_metrics.as_deref(),
            Some("28.4 BLEU on WMT 2014 En-De")
        );
    }

    #[test]
    fn json_surrounded_by_prose_and_fences() {
        let raw = format!("Here you go:\n```json\n{}\n```\nHope that helps!", valid());
        let rec = parse_response(&raw, "paper.pdf", Local::now()).unwrap();
        assert_eq!(rec.relevance_score.get(), 7);
    }

    #[test]
    fn non_json_is_parse_failure() {
        let err = parse_response("I cannot help with that.", "p.pdf", Local::now()).unwrap_err();
        match err {
            AnalysisError::Parse { raw, .. } => assert_eq!(raw, "I cannot help with that."),
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[test]
    fn each_required_field_is_enforced() {
        for name in [
            "title",
            "authors",
            "research_area",
            "relevance_score",
            "key_findings",
            "methodology",
            "recommended_action",
        ] {
            let mut v = valid();
            v.as_object_mut().unwrap().remove(name);
            assert_parse_failure(&v, name);

            let mut v = valid();
            v[name] = Value::Null;
            assert_parse_failure(&v, name);
        }
    }

    #[test]
    fn score_out_of_range_is_rejected() {
        for bad in [json!(0), json!(11), json!(-1), json!(100)] {
            let mut v = valid();
            v["relevance_score"] = bad;
            assert_parse_failure(&v, "outside");
        }
    }

    #[test]
    fn score_must_be_integer() {
        for bad in [json!(7.5), json!("high"), json!(true), json!([7])] {
            let mut v = valid();
            v["relevance_score"] = bad;
            assert_parse_failure(&v, "integer");
        }
    }

    #[test]
    fn score_is_not_coerced_from_strings_or_floats() {
        for bad in [json!("8"), json!(" 9 "), json!(10.0)] {
            let mut v = valid();
            v["relevance_score"] = bad;
            assert_parse_failure(&v, "integer");
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let mut v = valid();
        v["recommended_action"] = json!("Read Later");
        assert_parse_failure(&v, "recommended_action");
    }

    #[test]
    fn unknown_area_becomes_other() {
        let mut v = valid();
        v["research_area"] = json!("Computational Biology");
        assert_eq!(parse(&v).unwrap().research_area, ResearchArea::Other);
    }

    #[test]
    fn non_string_area_is_rejected() {
        let mut v = valid();
        v["research_area"] = json!(3);
        assert_parse_failure(&v, "research_area");
    }

    #[test]
    fn comma_separated_authors_are_split() {
        let mut v = valid();
        v["authors"] = json!("Ada Lovelace,  Charles Babbage , ");
        assert_eq!(
            parse(&v).unwrap().authors,
            vec!["Ada Lovelace", "Charles Babbage"]
        );
    }

    #[test]
    fn metrics_placeholders_become_none() {
        for placeholder in [json!("N/A"), json!("Not specified"), json!(""), Value::Null] {
            let mut v = valid();
            v["performance_metrics"] = placeholder;
            assert_eq!(parse(&v).unwrap().performance_metrics, None);
        }
        let mut v = valid();
        v.as_object_mut().unwrap().remove("performance_metrics");
        assert_eq!(parse(&v).unwrap().performance_metrics, None);
    }

    #[test]
    fn empty_authors_are_rejected() {
        for empty in [json!(""), json!([]), json!(" , ;"), json!(["  "])] {
            let mut v = valid();
            v["authors"] = empty;
            assert_parse_failure(&v, "authors");
        }
        let mut v = valid();
        v["authors"] = json!("Not specified");
        assert_eq!(parse(&v).unwrap().authors, vec!["Not specified"]);
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut v = valid();
        v["title"] = json!("   ");
        assert_parse_failure(&v, "title");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ééééé";
        let cut = truncate_text(text, 3);
        assert_eq!(cut, format!("ééé{}", TRUNCATION_MARKER));
        assert!(matches!(truncate_text(text, 5), Cow::Borrowed(_)));
        assert!(matches!(truncate_text(text, 50), Cow::Borrowed(_)));
    }

    #[test]
    fn prompt_embeds_text_domain_and_categories() {
        let prompt = build_prompt("PAPER BODY", "x.pdf", "graph databases");
        assert!(prompt.contains("PAPER BODY"));
        assert!(prompt.contains("Filename: x.pdf"));
        assert!(prompt.contains("relevance to graph databases research"));
        assert!(prompt.contains(
            "Data Pipelines, Distributed Systems, Hardware Acceleration, LLMs, Other"
        ));
        assert!(prompt.contains("Deep Read, Skim, Archive"));
    }

    #[tokio::test]
    async fn analyze_calls_backend_once_with_truncated_text() {
        let backend = Arc::new(MockCompletion::new(Ok(valid().to_string())));
        let analyzer = Analyzer::new(
            backend.clone(),
            AnalyzerSettings {
                max_input_chars: 10,
                relevance_domain: "compilers".into(),
            },
        );
        let rec = analyzer
            .analyze("0123456789ABCDEFGHIJ", "paper.pdf")
            .await
            .unwrap();
        assert_eq!(rec.title, "Attention Is All You Need");
        assert_eq!(backend.call_count(), 1);

        let prompt = backend.last_prompt().unwrap();
        assert!(prompt.contains("0123456789"));
        assert!(!prompt.contains("ABCDEFGHIJ"));
        assert!(prompt.contains("Text truncated"));
        assert!(prompt.contains("compilers"));
    }

    #[tokio::test]
    async fn backend_failure_is_call_error() {
        let backend = Arc::new(MockCompletion::new(Err(CompletionError::Network(
            "connection reset".into(),
        ))));
        let analyzer = Analyzer::new(backend.clone(), AnalyzerSettings::default());
        let err = analyzer.analyze("text", "paper.pdf").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Call(CompletionError::Network(_))));
        assert_eq!(backend.call_count(), 1);
    }
}
