//! Merging AI and heuristic candidates into one result.
//!
//! Rules, first match wins:
//!
//! 1. Unusable candidates (zero confidence, no figures) are dropped, and a
//!    candidate without VAT figures loses to one that has them.
//! 2. Both present and disagreeing on sales or purchase VAT: heuristic,
//!    one `ReconciliationDiscrepancy` warning, tier Low.
//! 3. AI confidence at or above `high_confidence`: AI, tier High.
//! 4. Both present and agreeing: AI, tier Medium.
//! 5. One candidate: it, tier Medium when cross-checked, Low otherwise.
//! 6. None: no figures.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::figures::amounts::format_euro;
use crate::models::config::ReconcileConfig;
use crate::models::figures::{ConfidenceTier, FigureCandidate, Warning, WarningKind};

/// Outcome of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The chosen candidate, `None` when neither was usable.
    pub candidate: Option<FigureCandidate>,
    pub tier: ConfidenceTier,
    pub warnings: Vec<Warning>,
}

impl Reconciliation {
    fn chosen(candidate: FigureCandidate, tier: ConfidenceTier) -> Self {
        Self {
            candidate: Some(candidate),
            tier,
            warnings: Vec::new(),
        }
    }
}

/// Applies the reconciliation rules.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    pub fn reconcile(
        &self,
        ai: Option<FigureCandidate>,
        heuristic: Option<FigureCandidate>,
    ) -> Reconciliation {
        let ai = ai.filter(FigureCandidate::is_usable);
        let heuristic = heuristic.filter(FigureCandidate::is_usable);

        let (ai, heuristic) = match (ai, heuristic) {
            (Some(a), Some(h)) if a.has_vat() && !h.has_vat() => (Some(a), None),
            (Some(a), Some(h)) if !a.has_vat() && h.has_vat() => (None, Some(h)),
            pair => pair,
        };

        match (ai, heuristic) {
            (Some(ai), Some(heuristic)) => {
                if let Some(detail) = self.discrepancy(&ai, &heuristic) {
                    warn!("AI and heuristic disagree: {}", detail);
                    return Reconciliation {
                        candidate: Some(heuristic),
                        tier: ConfidenceTier::Low,
                        warnings: vec![Warning::new(WarningKind::ReconciliationDiscrepancy, detail)],
                    };
                }
                let tier = if self.is_confident(&ai) {
                    ConfidenceTier::High
                } else {
                    ConfidenceTier::Medium
                };
                debug!("AI and heuristic agree, using AI ({:?})", tier);
                Reconciliation::chosen(ai, tier)
            }
            (Some(ai), None) if self.is_confident(&ai) => Reconciliation::chosen(ai, ConfidenceTier::High),
            (Some(only), None) | (None, Some(only)) => {
                let tier = if only.verified {
                    ConfidenceTier::Medium
                } else {
                    ConfidenceTier::Low
                };
                debug!("Single {} candidate ({:?})", only.source, tier);
                Reconciliation::chosen(only, tier)
            }
            (None, None) => Reconciliation {
                candidate: None,
                tier: ConfidenceTier::Low,
                warnings: Vec::new(),
            },
        }
    }

    fn is_confident(&self, ai: &FigureCandidate) -> bool {
        ai.confidence >= self.config.high_confidence
    }

    /// Describe the first VAT figure the candidates disagree on.
    fn discrepancy(&self, ai: &FigureCandidate, heuristic: &FigureCandidate) -> Option<String> {
        let fields = [
            ("sales VAT", ai.sales_vat, heuristic.sales_vat),
            ("purchase VAT", ai.purchase_vat, heuristic.purchase_vat),
        ];

        fields.into_iter().find_map(|(name, a, h)| {
            let (a, h) = (a.unwrap_or_default(), h.unwrap_or_default());
            (!self.agree(a, h)).then(|| {
                format!(
                    "{}: AI {} vs heuristic {}; using heuristic",
                    name,
                    format_euro(a),
                    format_euro(h)
                )
            })
        })
    }

    /// Within `agreement_tolerance_percent` of the larger value, and never
    /// stricter than one cent.
    pub fn agree(&self, a: Decimal, b: Decimal) -> bool {
        let relative = a.abs().max(b.abs()) * self.config.agreement_tolerance_percent / Decimal::ONE_HUNDRED;
        let allowed = relative.max(Decimal::new(1, 2));
        (a - b).abs() <= allowed
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}
