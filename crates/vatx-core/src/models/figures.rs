//! VAT figure models: candidates, reconciled outcomes and batch results.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};

use crate::error::FailureReason;
use crate::hash::ContentHash;

/// Irish VAT rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VatRate {
    /// Standard rate: 23%
    Standard23,
    /// Reduced rate: 13.5%
    Reduced13_5,
    /// Second reduced rate: 9%
    SecondReduced9,
    /// Livestock rate: 4.8%
    Livestock4_8,
    /// Zero rate: 0%
    Zero,
    /// Exempt from VAT.
    Exempt,
    /// Any other rate, in basis points (e.g. 2100 for 21%).
    Other(u32),
}

impl VatRate {
    const KNOWN: [VatRate; 5] = [
        VatRate::Standard23,
        VatRate::Reduced13_5,
        VatRate::SecondReduced9,
        VatRate::Livestock4_8,
        VatRate::Zero,
    ];

    /// Get the VAT rate as a decimal multiplier (e.g., 0.23 for 23%).
    pub fn as_decimal(&self) -> Decimal {
        match self {
            VatRate::Standard23 => Decimal::new(23, 2),
            VatRate::Reduced13_5 => Decimal::new(135, 3),
            VatRate::SecondReduced9 => Decimal::new(9, 2),
            VatRate::Livestock4_8 => Decimal::new(48, 3),
            VatRate::Zero | VatRate::Exempt => Decimal::ZERO,
            VatRate::Other(bp) => Decimal::new(*bp as i64, 4),
        }
    }

    /// Parse VAT rate from string ("23%", "13.5", "exempt", "0.23").
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let s = s.trim_end_matches('%').trim();

        match s {
            "ex" | "exempt" | "exempted" => return Some(VatRate::Exempt),
            "" => return None,
            _ => {}
        }

        let mut value: Decimal = s.replace(',', ".").parse().ok()?;
        // Fractions such as 0.23 are multipliers, not percentages.
        if value > Decimal::ZERO && value < Decimal::ONE {
            value *= Decimal::ONE_HUNDRED;
        }
        Self::from_percent(value)
    }

    /// Map a percentage onto a known rate, or `Other`.
    pub fn from_percent(percent: Decimal) -> Option<Self> {
        if percent.is_sign_negative() || percent > Decimal::ONE_HUNDRED {
            return None;
        }
        let multiplier = percent / Decimal::ONE_HUNDRED;
        if let Some(known) = Self::KNOWN.iter().find(|r| r.as_decimal() == multiplier) {
            return Some(*known);
        }
        (percent * Decimal::ONE_HUNDRED).round().to_u32().map(VatRate::Other)
    }

    /// Closest known rate to an observed tax/net ratio, within `tolerance`
    /// (as a multiplier, e.g. 0.005 for half a percentage point).
    pub fn nearest(ratio: Decimal, tolerance: Decimal) -> Option<Self> {
        Self::KNOWN
            .iter()
            .map(|r| (*r, (r.as_decimal() - ratio).abs()))
            .filter(|(_, diff)| *diff <= tolerance)
            .min_by(|a, b| a.1.cmp(&b.1))
            .map(|(r, _)| r)
    }

    /// Format for display.
    pub fn display(&self) -> String {
        match self {
            VatRate::Standard23 => "23%".to_string(),
            VatRate::Reduced13_5 => "13.5%".to_string(),
            VatRate::SecondReduced9 => "9%".to_string(),
            VatRate::Livestock4_8 => "4.8%".to_string(),
            VatRate::Zero => "0%".to_string(),
            VatRate::Exempt => "exempt".to_string(),
            VatRate::Other(bp) => format!("{}%", (Decimal::new(*bp as i64, 2)).normalize()),
        }
    }
}

impl Serialize for VatRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display())
    }
}

/// A single line on a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub amount: Decimal,
    pub vat_rate: Option<VatRate>,
}

/// Which extractor produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Ai,
    Heuristic,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Ai => f.write_str("AI"),
            CandidateSource::Heuristic => f.write_str("heuristic"),
        }
    }
}

/// VAT figures proposed by one extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FigureCandidate {
    pub source: CandidateSource,
    pub sales_vat: Option<Decimal>,
    pub purchase_vat: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub line_items: Vec<LineItem>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// A deterministic cross-check (totals row, net + VAT = total) passed.
    #[serde(skip)]
    pub verified: bool,
}

impl FigureCandidate {
    /// An empty candidate with the given source.
    pub fn empty(source: CandidateSource) -> Self {
        Self {
            source,
            sales_vat: None,
            purchase_vat: None,
            total_amount: None,
            line_items: Vec::new(),
            confidence: 0.0,
            verified: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// True when any VAT figure is present.
    pub fn has_vat(&self) -> bool {
        self.sales_vat.is_some() || self.purchase_vat.is_some()
    }

    /// True when the candidate proposes anything at all.
    pub fn has_figures(&self) -> bool {
        self.has_vat() || self.total_amount.is_some() || !self.line_items.is_empty()
    }

    /// Candidates with zero confidence or no figures are ignored.
    pub fn is_usable(&self) -> bool {
        self.confidence > 0.0 && self.has_figures()
    }

    /// Sales VAT plus purchase VAT.
    pub fn combined_vat(&self) -> Decimal {
        self.sales_vat.unwrap_or_default() + self.purchase_vat.unwrap_or_default()
    }
}

/// Coarse trust bucket for reconciled figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Final status of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    PartialFailure,
    Failed,
}

/// Non-fatal issue attached to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    AiUnavailable,
    AiResponseMalformed,
    ReconciliationDiscrepancy,
    TotalsMismatch,
    PageLimitReached,
    DuplicateContent,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::AiUnavailable => "AiUnavailable",
            WarningKind::AiResponseMalformed => "AiResponseMalformed",
            WarningKind::ReconciliationDiscrepancy => "ReconciliationDiscrepancy",
            WarningKind::TotalsMismatch => "TotalsMismatch",
            WarningKind::PageLimitReached => "PageLimitReached",
            WarningKind::DuplicateContent => "DuplicateContent",
        }
    }
}

/// A warning, serialized as `"<kind>: <message>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reconciled figures as exposed to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Figures {
    pub sales_vat: Option<Decimal>,
    pub purchase_vat: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub line_items: Vec<LineItem>,
    /// Which extractor the figures came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CandidateSource>,
}

impl From<FigureCandidate> for Figures {
    fn from(c: FigureCandidate) -> Self {
        Self {
            sales_vat: c.sales_vat,
            purchase_vat: c.purchase_vat,
            total_amount: c.total_amount,
            line_items: c.line_items,
            source: Some(c.source),
        }
    }
}

/// The reconciled, immutable result for one document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub document_id: String,
    pub file_name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub confidence_tier: ConfidenceTier,
    pub figures: Figures,
    pub warnings: Vec<Warning>,
    pub content_hash: ContentHash,
}

impl ExtractionOutcome {
    /// A failed outcome; failures are always `Low`.
    pub fn failed(
        document_id: impl Into<String>,
        file_name: impl Into<String>,
        reason: FailureReason,
        message: impl Into<String>,
        content_hash: ContentHash,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            file_name: file_name.into(),
            status: OutcomeStatus::Failed,
            failure_reason: Some(reason),
            failure_message: Some(message.into()),
            confidence_tier: ConfidenceTier::Low,
            figures: Figures::default(),
            warnings,
            content_hash,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    /// Warnings of one kind.
    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// Aggregate VAT across succeeded documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VatTotals {
    pub sales_vat: Decimal,
    pub purchase_vat: Decimal,
    /// Sales VAT minus purchase VAT (payable when positive).
    pub net_vat: Decimal,
}

/// Counts for audit logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
}

/// Ordered outcomes of one batch plus aggregates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub outcomes: Vec<ExtractionOutcome>,
    pub totals: VatTotals,
    pub summary: BatchSummary,
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Aggregate outcomes; only `Succeeded` documents count towards totals.
    pub fn from_outcomes(outcomes: Vec<ExtractionOutcome>) -> Self {
        let mut totals = VatTotals::default();
        let mut summary = BatchSummary {
            processed: outcomes.len(),
            ..Default::default()
        };

        for outcome in &outcomes {
            match outcome.status {
                OutcomeStatus::Succeeded => {
                    summary.succeeded += 1;
                    totals.sales_vat += outcome.figures.sales_vat.unwrap_or_default();
                    totals.purchase_vat += outcome.figures.purchase_vat.unwrap_or_default();
                }
                OutcomeStatus::PartialFailure => summary.partial += 1,
                OutcomeStatus::Failed => summary.failed += 1,
            }
        }
        totals.net_vat = totals.sales_vat - totals.purchase_vat;

        Self {
            outcomes,
            totals,
            summary,
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_vat_rate_parsing() {
        assert_eq!(VatRate::parse("23%"), Some(VatRate::Standard23));
        assert_eq!(VatRate::parse("23"), Some(VatRate::Standard23));
        assert_eq!(VatRate::parse("13.5%"), Some(VatRate::Reduced13_5));
        assert_eq!(VatRate::parse("13,5"), Some(VatRate::Reduced13_5));
        assert_eq!(VatRate::parse("0.09"), Some(VatRate::SecondReduced9));
        assert_eq!(VatRate::parse("4.8"), Some(VatRate::Livestock4_8));
        assert_eq!(VatRate::parse("Exempt"), Some(VatRate::Exempt));
        assert_eq!(VatRate::parse("21%"), Some(VatRate::Other(2100)));
        assert_eq!(VatRate::parse("n/a"), None);
    }

    #[test]
    fn test_vat_rate_nearest() {
        assert_eq!(VatRate::nearest(dec("0.2299"), dec("0.005")), Some(VatRate::Standard23));
        assert_eq!(VatRate::nearest(dec("0.134"), dec("0.005")), Some(VatRate::Reduced13_5));
        assert_eq!(VatRate::nearest(dec("0.17"), dec("0.005")), None);
    }

    #[test]
    fn test_vat_rate_serializes_as_display() {
        assert_eq!(serde_json::to_string(&VatRate::Reduced13_5).unwrap(), "\"13.5%\"");
        assert_eq!(VatRate::Other(2100).display(), "21%");
    }

    #[test]
    fn test_candidate_usability() {
        let empty = FigureCandidate::empty(CandidateSource::Ai);
        assert!(!empty.is_usable());

        let mut zero_confidence = FigureCandidate::empty(CandidateSource::Ai);
        zero_confidence.sales_vat = Some(dec("10.00"));
        assert!(!zero_confidence.is_usable());

        let usable = zero_confidence.with_confidence(0.4);
        assert!(usable.is_usable());
        assert_eq!(usable.combined_vat(), dec("10.00"));
    }

    fn outcome(status: OutcomeStatus, sales: &str, purchase: &str) -> ExtractionOutcome {
        ExtractionOutcome {
            document_id: "doc".to_string(),
            file_name: "doc.csv".to_string(),
            status,
            failure_reason: None,
            failure_message: None,
            confidence_tier: ConfidenceTier::Medium,
            figures: Figures {
                sales_vat: Some(dec(sales)),
                purchase_vat: Some(dec(purchase)),
                ..Default::default()
            },
            warnings: Vec::new(),
            content_hash: ContentHash::of(sales.as_bytes()),
        }
    }

    #[test]
    fn test_batch_totals_only_count_succeeded() {
        let result = BatchResult::from_outcomes(vec![
            outcome(OutcomeStatus::Succeeded, "100.00", "20.00"),
            outcome(OutcomeStatus::PartialFailure, "999.00", "999.00"),
            outcome(OutcomeStatus::Succeeded, "50.50", "0.50"),
            outcome(OutcomeStatus::Failed, "1.00", "1.00"),
        ]);

        assert_eq!(result.totals.sales_vat, dec("150.50"));
        assert_eq!(result.totals.purchase_vat, dec("20.50"));
        assert_eq!(result.totals.net_vat, dec("130.00"));
        assert_eq!(
            result.summary,
            BatchSummary { processed: 4, succeeded: 2, partial: 1, failed: 1 }
        );
    }

    #[test]
    fn test_warning_serializes_as_string() {
        let warning = Warning::new(WarningKind::TotalsMismatch, "sum 1.00 vs 2.00");
        assert_eq!(
            serde_json::to_string(&warning).unwrap(),
            "\"TotalsMismatch: sum 1.00 vs 2.00\""
        );
    }
}
