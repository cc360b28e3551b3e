use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use papertriage_core::{AnalysisRecord, RecommendedAction, RunSummary};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Sample abstract analyzed by `demo` when no PDF is given.
pub const SAMPLE_TEXT: &str = "\
Attention Is All You Need

Ashish Vaswani, Noam Shazeer, Niki Parmar, Jakob Uszkoreit, Llion Jones,
Aidan N. Gomez, Lukasz Kaiser, Illia Polosukhin

Abstract: The dominant sequence transduction models are based on complex
recurrent or convolutional neural networks that include an encoder and a
decoder. The best performing models also connect the encoder and decoder
through an attention mechanism. We propose a new simple network architecture,
the Transformer, based solely on attention mechanisms, dispensing with
recurrence and convolutions entirely. Experiments on two machine translation
tasks show these models to be superior in quality while being more
parallelizable and requiring significantly less time to train.

On the WMT 2014 English-to-German translation task, our model achieves
28.4 BLEU, improving over the existing best results by over 2 BLEU. On the
WMT 2014 English-to-French translation task, our model establishes a new
single-model state-of-the-art BLEU score of 41.8 after training for 3.5 days
on eight GPUs, a small fraction of the training costs of the best models from
the literature.
";

pub const SAMPLE_FILENAME: &str = "sample_paper.pdf";

const RULE_WIDTH: usize = 70;

fn rule(w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}", "=".repeat(RULE_WIDTH))
}

fn heading(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", text.bold().cyan())
    } else {
        writeln!(w, "{}", text)
    }
}

/// Startup banner for `watch`.
pub fn print_banner(
    w: &mut dyn Write,
    inbox: &Path,
    sink_name: &str,
    sink_location: &str,
    model: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    rule(w)?;
    heading(w, " Research Paper Triage", color)?;
    rule(w)?;
    writeln!(w, "Watching:  {}", inbox.display())?;
    writeln!(w, "Output:    {} ({})", sink_location, sink_name)?;
    writeln!(w, "Model:     {}", model)?;
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Drop PDF files into the folder. Press Ctrl+C to stop.".dimmed())?;
    } else {
        writeln!(w, "Drop PDF files into the folder. Press Ctrl+C to stop.")?;
    }
    rule(w)?;
    Ok(())
}

fn action_label(action: RecommendedAction, color: ColorMode) -> String {
    let label = action.as_str();
    if !color.enabled() {
        return label.to_string();
    }
    match action {
        RecommendedAction::DeepRead => label.green().bold().to_string(),
        RecommendedAction::Skim => label.yellow().to_string(),
        RecommendedAction::Archive => label.dimmed().to_string(),
    }
}

/// Print every field of an analysis, the way `demo` shows it.
pub fn print_analysis(
    w: &mut dyn Write,
    record: &AnalysisRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    rule(w)?;
    heading(w, " ANALYSIS RESULTS", color)?;
    rule(w)?;

    let fields: [(&str, String); 4] = [
        ("Title", record.title.clone()),
        ("Authors", record.authors.join(", ")),
        ("Research Area", record.research_area.to_string()),
        ("Relevance Score", format!("{}/10", record.relevance_score)),
    ];
    for (name, value) in fields {
        writeln!(w)?;
        heading(w, &format!("{}:", name), color)?;
        writeln!(w, "{}", value)?;
    }

    let blocks = [
        ("Key Findings", record.key_findings.as_str()),
        ("Methodology", record.methodology.as_str()),
        (
            "Performance Metrics",
            record.performance_metrics.as_deref().unwrap_or("N/A"),
        ),
    ];
    for (name, value) in blocks {
        writeln!(w)?;
        heading(w, &format!("{}:", name), color)?;
        writeln!(w, "{}", value)?;
    }

    writeln!(w)?;
    heading(w, "Recommended Action:", color)?;
    writeln!(w, "{}", action_label(record.recommended_action, color))?;
    rule(w)?;
    Ok(())
}

pub fn print_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    let line = format!(
        "Stopped. {} processed, {} failed.",
        summary.processed, summary.failed
    );
    if color.enabled() && summary.failed > 0 {
        writeln!(w, "{}", line.yellow())
    } else {
        writeln!(w, "{}", line)
    }
}
