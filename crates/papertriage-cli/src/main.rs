use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use papertriage_core::config_file;
use papertriage_core::{
    Analyzer, CompletionBackend, GeminiBackend, InboxWatcher, Pipeline, Settings, TextExtractor,
};
use papertriage_pdf_mupdf::MupdfBackend;
use papertriage_sink::open_sink;

mod logging;
mod output;

use output::ColorMode;

/// Research Paper Triage - summarize PDFs dropped into a folder with Gemini
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Read settings from this TOML file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the inbox folder and process every PDF that lands there
    Watch {
        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Analyze a sample abstract (or one PDF) and print the result
    Demo {
        /// Analyze this PDF instead of the built-in sample. The file is not
        /// moved and nothing is written to the sink.
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => config_file::load_from_path(path).map_err(anyhow::Error::msg)?,
        None => config_file::load_config(),
    };
    let settings = Settings::from_env(&file).context("configuration error")?;
    let _log_guard = logging::init(&settings.log_level, &settings.log_file)?;
    tracing::debug!(?settings, "resolved settings");

    match cli.command {
        Command::Watch { no_color } => watch(settings, ColorMode(!no_color)).await,
        Command::Demo { pdf, no_color } => demo(settings, pdf, ColorMode(!no_color)).await,
    }
}

fn completion_backend(settings: &Settings) -> Arc<dyn CompletionBackend> {
    Arc::new(
        GeminiBackend::new(&settings.api_key, &settings.model, settings.max_tokens)
            .with_timeout(settings.request_timeout),
    )
}

async fn watch(settings: Settings, color: ColorMode) -> anyhow::Result<()> {
    let sink = open_sink(&settings.sink)
        .await
        .context("failed to open the record sink")?;
    let pipeline = Pipeline::new(
        TextExtractor::new(Arc::new(MupdfBackend::new())),
        Analyzer::new(completion_backend(&settings), settings.analyzer_settings()),
        sink.clone(),
        settings.directories(),
    );

    output::print_banner(
        &mut std::io::stdout().lock(),
        &settings.inbox,
        sink.name(),
        &sink.location(),
        &settings.model,
        color,
    )?;
    tracing::info!(
        inbox = %settings.inbox.display(),
        processed = %settings.processed.display(),
        failed = %settings.failed.display(),
        sink = %sink.name(),
        location = %sink.location(),
        "research paper triage started"
    );

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, finishing current paper");
            cancel_clone.cancel();
        }
    });

    let summary = InboxWatcher::new(pipeline, settings.settle)
        .run(cancel)
        .await
        .context("watcher failed")?;

    output::print_summary(&mut std::io::stdout().lock(), &summary, color)?;
    Ok(())
}

async fn demo(settings: Settings, pdf: Option<PathBuf>, color: ColorMode) -> anyhow::Result<()> {
    let (text, filename) = match pdf {
        Some(path) => {
            let extracted = TextExtractor::new(Arc::new(MupdfBackend::new()))
                .extract_blocking(path.clone())
                .await
                .with_context(|| format!("failed to extract text from {}", path.display()))?;
            println!(
                "Extracted {} words from {} page(s) of {}",
                extracted.word_count(),
                extracted.page_count,
                path.display()
            );
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            (extracted.text, name)
        }
        None => (
            output::SAMPLE_TEXT.to_string(),
            output::SAMPLE_FILENAME.to_string(),
        ),
    };

    let analyzer = Analyzer::new(completion_backend(&settings), settings.analyzer_settings());

    let spinner = ProgressBar::new_spinner();
    let template = if color.enabled() {
        "{spinner:.cyan} {msg}"
    } else {
        "{spinner} {msg}"
    };
    spinner.set_style(ProgressStyle::with_template(template)?);
    spinner.set_message(format!("Analyzing {} with {}...", filename, settings.model));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = analyzer.analyze(&text, &filename).await;
    spinner.finish_and_clear();
    let record = result.with_context(|| format!("analysis of {} failed", filename))?;

    output::print_analysis(&mut std::io::stdout().lock(), &record, color)?;
    Ok(())
}
