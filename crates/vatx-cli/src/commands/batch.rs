//! Batch command - extract and total VAT across many documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use vatx_core::{BatchCoordinator, BatchResult, OutcomeStatus, RawDocument};

use super::output::{OutputFormat, format_outcome, outcomes_csv, print_batch_summary};
use super::{AiFlags, CategoryArg, load_config, read_document};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Category applied to every matched document
    #[arg(long, value_enum, default_value = "other")]
    category: CategoryArg,

    /// Output directory for per-document results and the batch report
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each document
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also write a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed at once (overrides config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    #[command(flatten)]
    ai: AiFlags,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.ai.apply(&mut config);
    if let Some(jobs) = args.jobs {
        config.batch.max_concurrency = jobs;
    }

    // Everything the pattern matches is submitted; the validator decides
    // what is acceptable and reports the rest.
    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let coordinator = BatchCoordinator::new(config)?;

    let multi_progress = MultiProgress::new();
    let read_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    read_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files read")?
            .progress_chars("=>-"),
    );

    let mut documents: Vec<RawDocument> = Vec::with_capacity(files.len());
    let mut unreadable: Vec<(PathBuf, String)> = Vec::new();
    for path in &files {
        match read_document(path, args.category.into()) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                unreadable.push((path.clone(), e.to_string()));
            }
        }
        read_pb.inc(1);
    }
    read_pb.finish();

    let extract_pb = multi_progress.add(ProgressBar::new_spinner());
    extract_pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    extract_pb.set_message(format!(
        "Extracting VAT from {} documents ({} at a time)...",
        documents.len(),
        coordinator.config().batch.max_concurrency
    ));
    extract_pb.enable_steady_tick(Duration::from_millis(100));

    let result = coordinator.process_batch(documents).await;
    extract_pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        write_outputs(output_dir, &result, args.format)?;
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        fs::write(&summary_path, outcomes_csv(&result.outcomes)?)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        result.summary.processed,
        start.elapsed()
    );
    print_batch_summary(&result);

    let failed: Vec<_> = result
        .outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Failed)
        .collect();
    if !failed.is_empty() || !unreadable.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            println!(
                "  - {}: {}",
                outcome.document_id,
                outcome.failure_message.as_deref().unwrap_or("unknown error")
            );
        }
        for (path, error) in &unreadable {
            println!("  - {}: {}", path.display(), error);
        }
    }

    Ok(())
}

/// One file per outcome plus `batch.json` with totals.
fn write_outputs(output_dir: &Path, result: &BatchResult, format: OutputFormat) -> anyhow::Result<()> {
    for (index, outcome) in result.outcomes.iter().enumerate() {
        let stem = Path::new(&outcome.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        // Same-named files from different directories must not overwrite each other.
        let output_path = output_dir.join(format!("{:03}-{}.{}", index + 1, stem, format.extension()));

        fs::write(&output_path, format_outcome(outcome, format)?)?;
        debug!("Wrote output to {}", output_path.display());
    }

    let report_path = output_dir.join("batch.json");
    fs::write(&report_path, serde_json::to_string_pretty(result)?)?;
    debug!("Wrote batch report to {}", report_path.display());
    Ok(())
}
