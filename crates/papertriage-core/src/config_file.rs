use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration.
/// Every field is optional; environment variables override whatever is set
/// here and built-in defaults fill the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub gemini: Option<GeminiConfig>,
    pub folders: Option<FoldersConfig>,
    pub output: Option<OutputConfig>,
    pub logging: Option<LoggingConfig>,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoldersConfig {
    pub inbox: Option<String>,
    pub processed: Option<String>,
    pub failed: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub csv_path: Option<String>,
    pub sheets_credentials_path: Option<String>,
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_input_chars: Option<usize>,
    pub relevance_domain: Option<String>,
    pub settle_millis: Option<u64>,
}

/// Platform config path: `<config_dir>/papertriage/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("papertriage").join("config.toml"))
}

/// Name of the per-directory config file looked up in the working directory.
pub const LOCAL_CONFIG_NAME: &str = ".papertriage.toml";

/// Load config by cascading CWD `.papertriage.toml` over the platform config.
/// Missing files are skipped; unreadable or malformed ones are logged and
/// skipped.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_or_warn(&p));
    let cwd = load_or_warn(Path::new(LOCAL_CONFIG_NAME));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

fn load_or_warn(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }
    match load_from_path(path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            Some(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
            None
        }
    }
}

/// Load a config from a specific path.
pub fn load_from_path(path: &Path) -> Result<ConfigFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

fn pick<S, T: Clone>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> &Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(|s| field(s).clone())
        .or_else(|| base.as_ref().and_then(|s| field(s).clone()))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        gemini: Some(GeminiConfig {
            api_key: pick(&overlay.gemini, &base.gemini, |g| &g.api_key),
            model: pick(&overlay.gemini, &base.gemini, |g| &g.model),
            max_tokens: pick(&overlay.gemini, &base.gemini, |g| &g.max_tokens),
            request_timeout_secs: pick(&overlay.gemini, &base.gemini, |g| {
                &g.request_timeout_secs
            }),
        }),
        folders: Some(FoldersConfig {
            inbox: pick(&overlay.folders, &base.folders, |f| &f.inbox),
            processed: pick(&overlay.folders, &base.folders, |f| &f.processed),
            failed: pick(&overlay.folders, &base.folders, |f| &f.failed),
        }),
        output: Some(OutputConfig {
            csv_path: pick(&overlay.output, &base.output, |o| &o.csv_path),
            sheets_credentials_path: pick(&overlay.output, &base.output, |o| {
                &o.sheets_credentials_path
            }),
            sheet_name: pick(&overlay.output, &base.output, |o| &o.sheet_name),
        }),
        logging: Some(LoggingConfig {
            level: pick(&overlay.logging, &base.logging, |l| &l.level),
            file: pick(&overlay.logging, &base.logging, |l| &l.file),
        }),
        pipeline: Some(PipelineConfig {
            max_input_chars: pick(&overlay.pipeline, &base.pipeline, |p| &p.max_input_chars),
            relevance_domain: pick(&overlay.pipeline, &base.pipeline, |p| {
                &p.relevance_domain
            }),
            settle_millis: pick(&overlay.pipeline, &base.pipeline, |p| &p.settle_millis),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_parse() {
        let toml_str = "[folders]\ninbox = \"/data/inbox\"\n\n[pipeline]\nsettle_millis = 250\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let folders = parsed.folders.unwrap();
        assert_eq!(folders.inbox.as_deref(), Some("/data/inbox"));
        assert!(folders.processed.is_none());
        assert_eq!(parsed.pipeline.unwrap().settle_millis, Some(250));
        assert!(parsed.gemini.is_none());
    }

    #[test]
    fn unknown_types_are_rejected() {
        let toml_str = "[gemini]\nmax_tokens = \"lots\"\n";
        assert!(toml::from_str::<ConfigFile>(toml_str).is_err());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            gemini: Some(GeminiConfig {
                model: Some("gemini-1.5-pro".into()),
                max_tokens: Some(1024),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            gemini: Some(GeminiConfig {
                model: Some("gemini-2.5-flash".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).gemini.unwrap();
        assert_eq!(merged.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(merged.max_tokens, Some(1024));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            output: Some(OutputConfig {
                csv_path: Some("/base/results.csv".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(
            merged.output.unwrap().csv_path.as_deref(),
            Some("/base/results.csv")
        );
    }

    #[test]
    fn load_from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging\nlevel = 3").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(err.contains("failed to parse"));

        std::fs::write(&path, "[logging]\nlevel = \"DEBUG\"\n").unwrap();
        let config = load_from_path(&path).unwrap();
        assert_eq!(config.logging.unwrap().level.as_deref(), Some("DEBUG"));
    }
}
