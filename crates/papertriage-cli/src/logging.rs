use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a configured level name onto a `tracing` filter directive.
///
/// Accepts the usual Python logging names (`WARNING`, `CRITICAL`) as well as
/// the `tracing` ones, in any case.
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" | "CRITICAL" | "FATAL" => Some("error"),
        "OFF" | "NONE" => Some("off"),
        _ => None,
    }
}

/// Install the global subscriber: console output plus an append-only log file.
///
/// `RUST_LOG` wins over `level` when set. The returned guard must be held
/// until exit so buffered file output is flushed.
pub fn init(level: &str, log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let directive = level_directive(level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or("info")));

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", log_file.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    if directive.is_none() {
        tracing::warn!(level = %level, "unknown LOG_LEVEL, using INFO");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_level_names_are_accepted() {
        assert_eq!(level_directive("INFO"), Some("info"));
        assert_eq!(level_directive("warning"), Some("warn"));
        assert_eq!(level_directive("CRITICAL"), Some("error"));
        assert_eq!(level_directive(" Debug "), Some("debug"));
        assert_eq!(level_directive("verbose"), None);
    }
}
