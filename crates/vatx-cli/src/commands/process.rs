//! Process command - extract VAT figures from a single document.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use vatx_core::{BatchCoordinator, OutcomeStatus};

use super::output::{OutputFormat, format_outcome, tier_label};
use super::{AiFlags, CategoryArg, load_config, read_document};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, CSV, XLSX/XLS, JPG or PNG)
    #[arg(required = true)]
    input: PathBuf,

    /// Which side of the VAT return the document belongs to
    #[arg(long, value_enum, default_value = "other")]
    category: CategoryArg,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(flatten)]
    ai: AiFlags,

    /// Print the confidence tier and elapsed time to stderr
    #[arg(long)]
    show_confidence: bool,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.ai.apply(&mut config);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());
    let document = read_document(&args.input, args.category.into())?;
    let coordinator = BatchCoordinator::new(config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(if coordinator.ai_enabled() {
        "Extracting VAT figures (AI + rules)..."
    } else {
        "Extracting VAT figures..."
    });
    pb.enable_steady_tick(Duration::from_millis(100));

    let outcome = coordinator.process_document(&document).await;
    pb.finish_and_clear();

    let rendered = format_outcome(&outcome, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &rendered)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", rendered);
    }

    if args.show_confidence {
        eprintln!(
            "{} Confidence: {} ({} warning(s)), {}ms",
            style("ℹ").blue(),
            tier_label(outcome.confidence_tier),
            outcome.warnings.len(),
            start.elapsed().as_millis()
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if outcome.status == OutcomeStatus::Failed {
        anyhow::bail!(
            "{}: {}",
            outcome.file_name,
            outcome.failure_message.as_deref().unwrap_or("extraction failed")
        );
    }
    Ok(())
}
