//! Rendering outcomes as JSON, CSV or plain text.

use console::style;
use rust_decimal::Decimal;

use vatx_core::figures::amounts::format_euro;
use vatx_core::{BatchResult, ConfidenceTier, ExtractionOutcome, OutcomeStatus};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

const CSV_HEADER: [&str; 10] = [
    "document",
    "status",
    "confidence_tier",
    "sales_vat",
    "purchase_vat",
    "total_amount",
    "source",
    "failure_reason",
    "warnings",
    "content_hash",
];

pub fn format_outcome(outcome: &ExtractionOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Csv => outcomes_csv(std::slice::from_ref(outcome)),
        OutputFormat::Text => Ok(outcome_text(outcome)),
    }
}

/// One row per outcome, amounts as plain decimals.
pub fn outcomes_csv(outcomes: &[ExtractionOutcome]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;

    for outcome in outcomes {
        let amount = |d: Option<Decimal>| d.map(|d| d.to_string()).unwrap_or_default();
        let warnings: Vec<String> = outcome.warnings.iter().map(|w| w.to_string()).collect();

        wtr.write_record([
            outcome.file_name.as_str(),
            status_label(outcome.status),
            tier_label(outcome.confidence_tier),
            &amount(outcome.figures.sales_vat),
            &amount(outcome.figures.purchase_vat),
            &amount(outcome.figures.total_amount),
            &outcome.figures.source.map(|s| s.to_string()).unwrap_or_default(),
            &outcome.failure_reason.map(|r| format!("{:?}", r)).unwrap_or_default(),
            &warnings.join("; "),
            &outcome.content_hash.to_hex(),
        ])?;
    }

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

pub fn outcome_text(outcome: &ExtractionOutcome) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", outcome.file_name));
    output.push_str(&format!(
        "Status:   {} ({} confidence)\n",
        status_label(outcome.status),
        tier_label(outcome.confidence_tier)
    ));

    if let Some(reason) = outcome.failure_reason {
        output.push_str(&format!(
            "Reason:   {:?}: {}\n",
            reason,
            outcome.failure_message.as_deref().unwrap_or("")
        ));
        return output;
    }

    let figures = &outcome.figures;
    output.push('\n');
    if let Some(vat) = figures.sales_vat {
        output.push_str(&format!("  Sales VAT:    {}\n", format_euro(vat)));
    }
    if let Some(vat) = figures.purchase_vat {
        output.push_str(&format!("  Purchase VAT: {}\n", format_euro(vat)));
    }
    if let Some(total) = figures.total_amount {
        output.push_str(&format!("  Total:        {}\n", format_euro(total)));
    }
    if let Some(source) = figures.source {
        output.push_str(&format!("  Source:       {}\n", source));
    }

    if !figures.line_items.is_empty() {
        output.push_str("\nLine items:\n");
        for item in &figures.line_items {
            let rate = item.vat_rate.map(|r| format!(" @ {}", r.display())).unwrap_or_default();
            output.push_str(&format!("  {} {}{}\n", item.description, format_euro(item.amount), rate));
        }
    }

    if !outcome.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &outcome.warnings {
            output.push_str(&format!("  - {}\n", warning));
        }
    }

    output
}

/// Console summary printed after a batch.
pub fn print_batch_summary(result: &BatchResult) {
    let summary = &result.summary;
    println!(
        "   {} succeeded, {} partial, {} failed",
        style(summary.succeeded).green(),
        style(summary.partial).yellow(),
        style(summary.failed).red()
    );
    println!();
    println!("   Sales VAT:    {}", format_euro(result.totals.sales_vat));
    println!("   Purchase VAT: {}", format_euro(result.totals.purchase_vat));
    // Negative when a refund is due.
    println!("   Net VAT:      {}", format_euro(result.totals.net_vat));
}

pub fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Succeeded => "succeeded",
        OutcomeStatus::PartialFailure => "partial",
        OutcomeStatus::Failed => "failed",
    }
}

pub fn tier_label(tier: ConfidenceTier) -> &'static str {
    match tier {
        ConfidenceTier::High => "high",
        ConfidenceTier::Medium => "medium",
        ConfidenceTier::Low => "low",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vatx_core::{FailureReason, IntegrityHasher};

    #[test]
    fn test_failed_outcome_text_and_csv() {
        let outcome = ExtractionOutcome::failed(
            "scan.pdf",
            "scan.pdf",
            FailureReason::ExtractionTimeout,
            "pdf extraction timed out",
            IntegrityHasher::new().hash(b"%PDF-"),
            Vec::new(),
        );

        let text = outcome_text(&outcome);
        assert!(text.contains("Status:   failed (low confidence)"));
        assert!(text.contains("ExtractionTimeout: pdf extraction timed out"));

        let csv = outcomes_csv(&[outcome]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER.join(",").as_str()));
        assert!(lines.next().unwrap().starts_with("scan.pdf,failed,low,,,,,ExtractionTimeout,,"));
    }
}
