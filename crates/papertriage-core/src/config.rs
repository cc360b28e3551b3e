//! Runtime settings resolved from the environment, TOML config and defaults.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::analyzer::{AnalyzerSettings, DEFAULT_MAX_INPUT_CHARS, DEFAULT_RELEVANCE_DOMAIN};
use crate::config_file::ConfigFile;
use crate::pipeline::Directories;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_INBOX: &str = "papers_inbox";
pub const DEFAULT_PROCESSED: &str = "papers_processed";
pub const DEFAULT_FAILED: &str = "papers_failed";
pub const DEFAULT_CSV_PATH: &str = "research_papers_results.csv";
pub const DEFAULT_SHEET_NAME: &str = "Research Paper Triage";
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_LOG_FILE: &str = "paper_triage.log";
pub const DEFAULT_SETTLE_MILLIS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set (set it in the environment, .env or the config file)")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where analysis records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSettings {
    Csv {
        path: PathBuf,
    },
    Sheets {
        credentials_path: PathBuf,
        sheet_name: String,
    },
}

#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub inbox: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
    pub sink: SinkSettings,
    pub log_level: String,
    pub log_file: PathBuf,
    pub max_input_chars: usize,
    pub relevance_domain: String,
    pub settle: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("inbox", &self.inbox)
            .field("processed", &self.processed)
            .field("failed", &self.failed)
            .field("sink", &self.sink)
            .field("log_level", &self.log_level)
            .field("log_file", &self.log_file)
            .field("max_input_chars", &self.max_input_chars)
            .field("relevance_domain", &self.relevance_domain)
            .field("settle", &self.settle)
            .finish()
    }
}

/// One layer of lookup: environment first, then the config file value.
struct Resolver<'a, F> {
    env: F,
    file: &'a ConfigFile,
}

impl<F> Resolver<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn env(&self, key: &str) -> Option<String> {
        (self.env)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, from_file: Option<String>) -> Option<String> {
        self.env(key)
            .or_else(|| from_file.filter(|v| !v.trim().is_empty()))
    }

    fn number<T>(
        &self,
        key: &'static str,
        from_file: Option<T>,
        default: T,
    ) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = match self.env(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => from_file.unwrap_or(default),
        };
        Ok(value)
    }
}

fn require_positive<T: PartialOrd + From<u8> + ToString>(
    key: &'static str,
    value: T,
) -> Result<T, ConfigError> {
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

/// Absolute form of `path` for identity checks. Existing paths are
/// canonicalized; others are resolved lexically against the working directory.
fn normalized(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

impl Settings {
    /// Resolve settings from the process environment over `file`.
    pub fn from_env(file: &ConfigFile) -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok(), file)
    }

    /// Resolve settings with an arbitrary variable lookup over `file`.
    ///
    /// Empty variables count as unset. `GEMINI_API_KEY` is the only key
    /// without a default.
    pub fn resolve<F>(lookup: F, file: &ConfigFile) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let r = Resolver { env: lookup, file };
        let gemini = r.file.gemini.clone().unwrap_or_default();
        let folders = r.file.folders.clone().unwrap_or_default();
        let output = r.file.output.clone().unwrap_or_default();
        let logging = r.file.logging.clone().unwrap_or_default();
        let pipeline = r.file.pipeline.clone().unwrap_or_default();

        let api_key = r
            .string("GEMINI_API_KEY", gemini.api_key)
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;
        let model = r
            .string("GEMINI_MODEL", gemini.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = require_positive(
            "MAX_TOKENS",
            r.number("MAX_TOKENS", gemini.max_tokens, DEFAULT_MAX_TOKENS)?,
        )?;
        let timeout_secs = require_positive(
            "REQUEST_TIMEOUT_SECS",
            r.number(
                "REQUEST_TIMEOUT_SECS",
                gemini.request_timeout_secs,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
        )?;

        let path_or = |key: &str, from_file: Option<String>, default: &str| {
            PathBuf::from(r.string(key, from_file).unwrap_or_else(|| default.to_string()))
        };
        let inbox = path_or("PAPERS_INBOX", folders.inbox, DEFAULT_INBOX);
        let processed = path_or("PAPERS_PROCESSED", folders.processed, DEFAULT_PROCESSED);
        let failed = path_or("PAPERS_FAILED", folders.failed, DEFAULT_FAILED);
        let inbox_key = normalized(&inbox);
        if inbox_key == normalized(&processed) || inbox_key == normalized(&failed) {
            return Err(ConfigError::Invalid {
                key: "PAPERS_INBOX",
                value: inbox.display().to_string(),
                reason: "must differ from the processed and failed directories".to_string(),
            });
        }

        let sink = match r.string(
            "GOOGLE_SHEETS_CREDENTIALS_PATH",
            output.sheets_credentials_path,
        ) {
            Some(credentials) => SinkSettings::Sheets {
                credentials_path: PathBuf::from(credentials),
                sheet_name: r
                    .string("SHEET_NAME", output.sheet_name)
                    .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
            },
            None => SinkSettings::Csv {
                path: path_or("CSV_OUTPUT_PATH", output.csv_path, DEFAULT_CSV_PATH),
            },
        };

        let log_level = r
            .string("LOG_LEVEL", logging.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_file = path_or("LOG_FILE", logging.file, DEFAULT_LOG_FILE);

        let max_input_chars = require_positive(
            "MAX_INPUT_CHARS",
            r.number(
                "MAX_INPUT_CHARS",
                pipeline.max_input_chars,
                DEFAULT_MAX_INPUT_CHARS,
            )?,
        )?;
        let relevance_domain = r
            .string("RELEVANCE_DOMAIN", pipeline.relevance_domain)
            .unwrap_or_else(|| DEFAULT_RELEVANCE_DOMAIN.to_string());
        let settle_millis = r.number("SETTLE_MILLIS", pipeline.settle_millis, DEFAULT_SETTLE_MILLIS)?;

        Ok(Settings {
            api_key,
            model,
            max_tokens,
            request_timeout: Duration::from_secs(timeout_secs),
            inbox,
            processed,
            failed,
            sink,
            log_level,
            log_file,
            max_input_chars,
            relevance_domain,
            settle: Duration::from_millis(settle_millis),
        })
    }

    pub fn directories(&self) -> Directories {
        Directories {
            inbox: self.inbox.clone(),
            processed: self.processed.clone(),
            failed: self.failed.clone(),
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            max_input_chars: self.max_input_chars,
            relevance_domain: self.relevance_domain.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{FoldersConfig, GeminiConfig, OutputConfig};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_only_api_key() {
        let s = Settings::resolve(env(&[("GEMINI_API_KEY", "k")]), &ConfigFile::default()).unwrap();
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.max_tokens, 8192);
        assert_eq!(s.inbox, PathBuf::from("papers_inbox"));
        assert_eq!(s.processed, PathBuf::from("papers_processed"));
        assert_eq!(s.failed, PathBuf::from("papers_failed"));
        assert_eq!(
            s.sink,
            SinkSettings::Csv {
                path: PathBuf::from("research_papers_results.csv")
            }
        );
        assert_eq!(s.log_level, "INFO");
        assert_eq!(s.max_input_chars, 100_000);
        assert_eq!(s.settle, Duration::from_millis(1000));
        assert_eq!(s.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn missing_api_key_is_configuration_missing() {
        let err = Settings::resolve(env(&[]), &ConfigFile::default()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GEMINI_API_KEY"));

        let err = Settings::resolve(env(&[("GEMINI_API_KEY", "  ")]), &ConfigFile::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("GEMINI_API_KEY"));
    }

    #[test]
    fn credentials_path_selects_sheets() {
        let s = Settings::resolve(
            env(&[
                ("GEMINI_API_KEY", "k"),
                ("GOOGLE_SHEETS_CREDENTIALS_PATH", "/secrets/sa.json"),
            ]),
            &ConfigFile::default(),
        )
        .unwrap();
        assert_eq!(
            s.sink,
            SinkSettings::Sheets {
                credentials_path: PathBuf::from("/secrets/sa.json"),
                sheet_name: DEFAULT_SHEET_NAME.to_string(),
            }
        );
    }

    #[test]
    fn env_overrides_file_overrides_default() {
        let file = ConfigFile {
            gemini: Some(GeminiConfig {
                api_key: Some("from-file".into()),
                model: Some("file-model".into()),
                max_tokens: Some(2048),
                ..Default::default()
            }),
            folders: Some(FoldersConfig {
                inbox: Some("/file/inbox".into()),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                csv_path: Some("/file/out.csv".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let s = Settings::resolve(
            env(&[("GEMINI_MODEL", "env-model"), ("PAPERS_INBOX", "/env/inbox")]),
            &file,
        )
        .unwrap();
        assert_eq!(s.api_key, "from-file");
        assert_eq!(s.model, "env-model");
        assert_eq!(s.max_tokens, 2048);
        assert_eq!(s.inbox, PathBuf::from("/env/inbox"));
        assert_eq!(
            s.sink,
            SinkSettings::Csv {
                path: PathBuf::from("/file/out.csv")
            }
        );
    }

    #[test]
    fn malformed_numbers_are_invalid() {
        let err = Settings::resolve(
            env(&[("GEMINI_API_KEY", "k"), ("MAX_TOKENS", "many")]),
            &ConfigFile::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_TOKENS", .. }));

        let err = Settings::resolve(
            env(&[("GEMINI_API_KEY", "k"), ("MAX_INPUT_CHARS", "0")]),
            &ConfigFile::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_INPUT_CHARS", .. }));
    }

    #[test]
    fn inbox_must_differ_from_holding_dirs() {
        let err = Settings::resolve(
            env(&[
                ("GEMINI_API_KEY", "k"),
                ("PAPERS_INBOX", "papers"),
                ("PAPERS_PROCESSED", "papers"),
            ]),
            &ConfigFile::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PAPERS_INBOX", .. }));
    }

    #[test]
    fn equivalent_spellings_of_inbox_are_rejected() {
        for (inbox, other) in [
            ("papers", "./papers"),
            ("papers", "drafts/../papers"),
            ("./papers/", "papers"),
        ] {
            for key in ["PAPERS_PROCESSED", "PAPERS_FAILED"] {
                let err = Settings::resolve(
                    env(&[("GEMINI_API_KEY", "k"), ("PAPERS_INBOX", inbox), (key, other)]),
                    &ConfigFile::default(),
                )
                .unwrap_err();
                assert!(
                    matches!(err, ConfigError::Invalid { key: "PAPERS_INBOX", .. }),
                    "{inbox} vs {key}={other}"
                );
            }
        }
    }

    #[test]
    fn debug_redacts_api_key() {
        let s = Settings::resolve(env(&[("GEMINI_API_KEY", "sk-secret")]), &ConfigFile::default())
            .unwrap();
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("sk-secret"));
    }
}
