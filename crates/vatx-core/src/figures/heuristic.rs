//! Deterministic VAT figure extraction from tables and free text.

use std::cmp::Reverse;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::config::HeuristicConfig;
use crate::models::document::{Cell, DocumentCategory, ExtractedContent, TableContent};
use crate::models::figures::{CandidateSource, FigureCandidate, LineItem, VatRate, Warning, WarningKind};

use super::amounts::parse_amount;
use super::patterns::*;

/// Result of a heuristic pass.
#[derive(Debug, Clone, Default)]
pub struct HeuristicResult {
    /// Proposed figures, `None` when nothing was found.
    pub candidate: Option<FigureCandidate>,
    /// Non-fatal findings such as totals that do not add up.
    pub warnings: Vec<Warning>,
}

/// Regex and column based extractor. Pure and synchronous.
#[derive(Debug, Clone)]
pub struct HeuristicFigureExtractor {
    config: HeuristicConfig,
}

impl HeuristicFigureExtractor {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Extract figures from already-extracted content.
    pub fn extract(&self, content: &ExtractedContent, category: DocumentCategory) -> HeuristicResult {
        if let Some(table) = &content.table {
            if let Some(result) = self.extract_table(table, category) {
                return result;
            }
            // No recognisable tax columns, read the table as text.
            return self.extract_text(&table.to_text(), category);
        }

        match content.text.as_deref() {
            Some(text) if !text.trim().is_empty() => self.extract_text(text, category),
            _ => HeuristicResult::default(),
        }
    }

    /// Column-sum extraction. `None` when the table has no tax columns.
    fn extract_table(&self, table: &TableContent, category: DocumentCategory) -> Option<HeuristicResult> {
        let header = table.header()?;

        let tax_columns: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_text().is_some_and(is_tax_header))
            .map(|(i, _)| i)
            .collect();
        if tax_columns.is_empty() {
            return None;
        }

        let amount_column = header
            .iter()
            .enumerate()
            .find(|(i, c)| !tax_columns.contains(i) && c.as_text().is_some_and(is_gross_header))
            .map(|(i, _)| i);

        let mut column_sums = vec![Decimal::ZERO; tax_columns.len()];
        let mut total_amount = Decimal::ZERO;
        let mut saw_amount = false;
        let mut line_items = Vec::new();

        for (index, row) in table.data_rows() {
            let mut row_tax = Decimal::ZERO;
            for (slot, &col) in tax_columns.iter().enumerate() {
                if let Some(value) = row.get(col).and_then(Cell::as_decimal) {
                    if value > Decimal::ZERO {
                        column_sums[slot] += value;
                        row_tax += value;
                    }
                }
            }

            let gross = amount_column.and_then(|col| row.get(col)).and_then(Cell::as_decimal);
            if let Some(gross) = gross {
                total_amount += gross;
                saw_amount = true;
            }

            if row_tax > Decimal::ZERO {
                line_items.push(LineItem {
                    description: row_description(row, &tax_columns, amount_column)
                        .unwrap_or_else(|| format!("Row {}", index + 1)),
                    amount: gross.unwrap_or(row_tax),
                    vat_rate: gross.and_then(|g| infer_rate(row_tax, g)),
                });
            }
        }

        let combined: Decimal = column_sums.iter().copied().sum();
        let mut result = HeuristicResult::default();

        let verified = match table.totals_rows.first() {
            Some(&totals_index) => {
                let totals = &table.rows[totals_index];
                if self.totals_agree(totals, &tax_columns, &column_sums, combined) {
                    true
                } else {
                    result.warnings.push(Warning::new(
                        WarningKind::TotalsMismatch,
                        format!(
                            "tax columns sum to {} but the totals row does not match",
                            combined.round_dp(2)
                        ),
                    ));
                    false
                }
            }
            None => false,
        };

        if combined.is_zero() && !saw_amount {
            debug!("Table has tax columns but no positive tax values");
            return Some(result);
        }

        let mut candidate = FigureCandidate::empty(CandidateSource::Heuristic);
        if !combined.is_zero() {
            assign_side(&mut candidate, combined, category);
        }
        if saw_amount {
            candidate.total_amount = Some(total_amount);
        }
        candidate.line_items = line_items;
        candidate.verified = verified;
        candidate = candidate.with_confidence(self.confidence_for(verified));

        debug!(
            "Table heuristic: {} tax columns, combined VAT {}, verified={}",
            tax_columns.len(),
            combined,
            verified
        );

        result.candidate = Some(candidate);
        Some(result)
    }

    // Column sums against the totals row. Exports often shift the totals
    // row by a column, so any numeric cell in it may hold a column's sum.
    fn totals_agree(
        &self,
        totals: &[Cell],
        tax_columns: &[usize],
        column_sums: &[Decimal],
        combined: Decimal,
    ) -> bool {
        let tolerance = self.config.totals_tolerance;
        let close = |a: Decimal, b: Decimal| (a - b).abs() <= tolerance;
        let numeric: Vec<Decimal> = totals.iter().filter_map(Cell::as_decimal).collect();

        let per_column = tax_columns.iter().zip(column_sums).all(|(&col, &sum)| {
            let aligned = totals.get(col).and_then(Cell::as_decimal);
            aligned.is_some_and(|v| close(v, sum)) || numeric.iter().any(|&v| close(v, sum))
        });

        per_column || numeric.iter().any(|&v| close(v, combined))
    }

    /// Labelled-amount extraction from free text.
    fn extract_text(&self, text: &str, category: DocumentCategory) -> HeuristicResult {
        let sales = best_match(&SALES_VAT, text, |_| true);
        let purchase = best_match(&PURCHASE_VAT, text, |_| true);
        let total = best_match(&TOTAL_AMOUNT, text, |m| !MENTIONS_TAX.is_match(m.gap));
        let net = best_match(&NET_AMOUNT, text, |m| !MENTIONS_TAX.is_match(m.gap));

        let mut candidate = FigureCandidate::empty(CandidateSource::Heuristic);
        candidate.sales_vat = sales.map(|m| m.value);
        candidate.purchase_vat = purchase.map(|m| m.value);

        if !candidate.has_vat() {
            let generic = best_match(&GENERIC_VAT, text, |m| {
                !NOT_VAT_QUALIFIER.is_match(&tail(text, m.start, 16))
            });
            if let Some(m) = generic {
                assign_side(&mut candidate, m.value, category);
            }
        }

        candidate.total_amount = total.as_ref().map(|m| m.value);
        candidate.line_items = extract_line_items(text);

        if !candidate.has_figures() {
            return HeuristicResult::default();
        }

        let tolerance = self.config.totals_tolerance;
        let verified = match (net, total) {
            (Some(net), Some(total)) if candidate.has_vat() => {
                (net.value + candidate.combined_vat() - total.value).abs() <= tolerance
            }
            _ => false,
        };

        debug!(
            "Text heuristic: sales={:?} purchase={:?} total={:?} verified={}",
            candidate.sales_vat, candidate.purchase_vat, candidate.total_amount, verified
        );

        candidate.verified = verified;
        HeuristicResult {
            candidate: Some(candidate.with_confidence(self.confidence_for(verified))),
            warnings: Vec::new(),
        }
    }

    fn confidence_for(&self, verified: bool) -> f32 {
        if verified {
            self.config.verified_confidence
        } else {
            self.config.unverified_confidence
        }
    }
}

impl Default for HeuristicFigureExtractor {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

// Unlabelled VAT goes on the purchase side only for purchase documents.
fn assign_side(candidate: &mut FigureCandidate, vat: Decimal, category: DocumentCategory) {
    if category.is_purchase_side() {
        candidate.purchase_vat = Some(vat);
    } else {
        candidate.sales_vat = Some(vat);
    }
}

// "VAT" or "Item Tax Amt.", but not "VAT Rate", "Net (ex VAT)" or "Total (incl. VAT)".
fn is_tax_header(header: &str) -> bool {
    TAX_COLUMN.is_match(header)
        && !NET_OF_TAX.is_match(header)
        && !GROSS_OF_TAX.is_match(header)
        && !TAX_ATTRIBUTE.is_match(header)
}

fn is_gross_header(header: &str) -> bool {
    AMOUNT_COLUMN.is_match(header) && !NET_OF_TAX.is_match(header)
}

fn row_description(row: &[Cell], tax_columns: &[usize], amount_column: Option<usize>) -> Option<String> {
    row.iter()
        .enumerate()
        .filter(|(i, c)| !tax_columns.contains(i) && Some(*i) != amount_column && !c.is_empty())
        .map(|(_, c)| c.to_string())
        .next()
}

// tax / (gross - tax) against the Irish rates, half a point either way.
fn infer_rate(tax: Decimal, gross: Decimal) -> Option<VatRate> {
    let net = gross - tax;
    if net <= Decimal::ZERO {
        return None;
    }
    VatRate::nearest(tax / net, Decimal::new(5, 3))
}

#[derive(Debug, Clone, Copy)]
struct LabelledAmount<'t> {
    label: &'t str,
    gap: &'t str,
    value: Decimal,
    start: usize,
}

impl LabelledAmount<'_> {
    fn specificity(&self) -> u8 {
        let label = self.label.to_lowercase();
        u8::from(label.contains("total") || label.contains("amount"))
    }
}

// Most specific label, then shortest gap, then the last occurrence.
fn best_match<'t>(
    re: &Regex,
    text: &'t str,
    accept: impl Fn(&LabelledAmount<'t>) -> bool,
) -> Option<LabelledAmount<'t>> {
    re.captures_iter(text)
        .filter_map(|caps| {
            let label = caps.name("label")?;
            let gap = caps.name("gap")?;
            let value = parse_amount(caps.name("amount")?.as_str())?;
            Some(LabelledAmount {
                label: label.as_str(),
                gap: gap.as_str(),
                value,
                start: label.start(),
            })
        })
        .filter(|m| accept(m))
        .max_by_key(|m| (m.specificity(), Reverse(m.gap.len()), m.start))
}

// Up to `n` characters before byte offset `end`.
fn tail(text: &str, end: usize, n: usize) -> String {
    let before = &text[..end];
    let start = before
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    before[start..].to_string()
}

fn extract_line_items(text: &str) -> Vec<LineItem> {
    LINE_ITEM
        .captures_iter(text)
        .filter_map(|caps| {
            let description = caps.name("desc")?.as_str().trim();
            if SUMMARY_DESCRIPTION.is_match(description) {
                return None;
            }
            Some(LineItem {
                description: description.to_string(),
                amount: parse_amount(caps.name("amount")?.as_str())?,
                vat_rate: VatRate::parse(caps.name("rate")?.as_str()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn table(rows: &[&[&str]], header_row: usize, totals_rows: Vec<usize>) -> ExtractedContent {
        ExtractedContent::table(TableContent {
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| Cell::from_text(c)).collect())
                .collect(),
            header_row: Some(header_row),
            totals_rows,
        })
    }

    fn marketplace_report() -> ExtractedContent {
        table(
            &[
                &["Order ID", "Item Tax Amt.", "Shipping Tax Amt.", "Total"],
                &["404-1", "2000.00", "150.00", "10850.00"],
                &["404-2", "3142.32", "225.88", "14000.00"],
                &["404-3", "0.00", "0.00", "50.00"],
                &["TOTAL", "", "5142.32", "375.88", "5518.20"],
            ],
            0,
            vec![4],
        )
    }

    #[test]
    fn test_marketplace_table_combines_tax_columns() {
        let result = HeuristicFigureExtractor::default()
            .extract(&marketplace_report(), DocumentCategory::Sales);

        assert!(result.warnings.is_empty());
        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.sales_vat, Some(dec("5518.20")));
        assert_eq!(candidate.purchase_vat, None);
        assert_eq!(candidate.total_amount, Some(dec("24900.00")));
        assert!(candidate.verified);
        assert_eq!(candidate.confidence, 0.6);
        assert_eq!(candidate.line_items.len(), 2);
        assert_eq!(candidate.line_items[0].description, "404-1");
    }

    #[test]
    fn test_table_vat_goes_to_purchase_side() {
        let result = HeuristicFigureExtractor::default()
            .extract(&marketplace_report(), DocumentCategory::Purchases);

        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.sales_vat, None);
        assert_eq!(candidate.purchase_vat, Some(dec("5518.20")));
    }

    #[test]
    fn test_table_totals_mismatch_warns() {
        let content = table(
            &[
                &["Invoice", "Net", "VAT", "Total"],
                &["A-1", "100.00", "23.00", "123.00"],
                &["Total", "100.00", "99.00", "123.00"],
            ],
            0,
            vec![2],
        );
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Sales);

        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::TotalsMismatch);
        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.sales_vat, Some(dec("23.00")));
        assert!(!candidate.verified);
        assert_eq!(candidate.confidence, 0.3);
        assert_eq!(candidate.line_items[0].vat_rate, Some(VatRate::Standard23));
    }

    #[test]
    fn test_qualified_vat_headers_are_not_tax_columns() {
        let content = table(
            &[
                &["Invoice", "Net (ex VAT)", "VAT Rate", "VAT", "Total (incl. VAT)"],
                &["INV-1", "100.00", "23", "23.00", "123.00"],
                &["INV-2", "200.00", "23", "46.00", "246.00"],
                &["Total", "300.00", "", "69.00", "369.00"],
            ],
            0,
            vec![3],
        );
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Sales);

        assert!(result.warnings.is_empty());
        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.sales_vat, Some(dec("69.00")));
        assert_eq!(candidate.total_amount, Some(dec("369.00")));
        assert!(candidate.verified);
        assert_eq!(candidate.line_items.len(), 2);
        assert_eq!(candidate.line_items[1].description, "INV-2");
        assert_eq!(candidate.line_items[1].amount, dec("246.00"));
        assert!(candidate.line_items.iter().all(|i| i.vat_rate == Some(VatRate::Standard23)));
    }

    #[test]
    fn test_registration_and_code_columns_are_ignored() {
        let content = table(
            &[
                &["Supplier", "VAT No.", "Tax Code", "Tax Amount", "Amount excl. VAT", "Total"],
                &["Acme", "IE6388047V", "S1", "4.60", "20.00", "24.60"],
            ],
            0,
            vec![],
        );
        let candidate = HeuristicFigureExtractor::default()
            .extract(&content, DocumentCategory::Purchases)
            .candidate
            .unwrap();

        assert_eq!(candidate.purchase_vat, Some(dec("4.60")));
        assert_eq!(candidate.total_amount, Some(dec("24.60")));
        assert_eq!(candidate.line_items[0].vat_rate, Some(VatRate::Standard23));
    }

    #[test]
    fn test_table_without_tax_columns_falls_back_to_text() {
        let content = table(&[&["Summary", "Amount"], &["Sales VAT", "230.00"]], 0, vec![]);
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Other);

        assert_eq!(result.candidate.unwrap().sales_vat, Some(dec("230.00")));
    }

    #[test]
    fn test_text_invoice_verified() {
        let text = "Invoice 42\n\
                    Consulting services 23% 1,000.00\n\
                    Net amount: €1,000.00\n\
                    VAT @ 23%: €230.00\n\
                    Total due: €1,230.00\n";
        let content = ExtractedContent::text(text.to_string(), Some(1));
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Sales);

        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.sales_vat, Some(dec("230.00")));
        assert_eq!(candidate.total_amount, Some(dec("1230.00")));
        assert!(candidate.verified);
        assert_eq!(candidate.confidence, 0.6);
        assert_eq!(
            candidate.line_items,
            vec![LineItem {
                description: "Consulting services".to_string(),
                amount: dec("1000.00"),
                vat_rate: Some(VatRate::Standard23),
            }]
        );
    }

    #[test]
    fn test_generic_vat_follows_category() {
        let content = ExtractedContent::text("Receipt\nVAT 4.60\n".to_string(), Some(1));
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Purchases);

        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.purchase_vat, Some(dec("4.60")));
        assert_eq!(candidate.sales_vat, None);
        assert!(!candidate.verified);
    }

    #[test]
    fn test_specific_labels_beat_generic() {
        let text = "Sales VAT 230.00\nPurchases VAT 45.00\nVAT 999.00\n";
        let content = ExtractedContent::text(text.to_string(), None);
        let candidate = HeuristicFigureExtractor::default()
            .extract(&content, DocumentCategory::Other)
            .candidate
            .unwrap();

        assert_eq!(candidate.sales_vat, Some(dec("230.00")));
        assert_eq!(candidate.purchase_vat, Some(dec("45.00")));
    }

    #[test]
    fn test_total_vat_label_is_more_specific() {
        let text = "Tax 5.00\nTotal VAT 7.00\n";
        let content = ExtractedContent::text(text.to_string(), None);
        let candidate = HeuristicFigureExtractor::default()
            .extract(&content, DocumentCategory::Sales)
            .candidate
            .unwrap();

        assert_eq!(candidate.sales_vat, Some(dec("7.00")));
        assert_eq!(candidate.total_amount, None);
    }

    #[test]
    fn test_ex_vat_amounts_are_not_vat() {
        let text = "Amount ex VAT 100.00\nTotal 123.00\n";
        let content = ExtractedContent::text(text.to_string(), None);
        let candidate = HeuristicFigureExtractor::default()
            .extract(&content, DocumentCategory::Sales)
            .candidate
            .unwrap();

        assert_eq!(candidate.sales_vat, None);
        assert_eq!(candidate.total_amount, Some(dec("123.00")));
        assert!(!candidate.has_vat());
    }

    #[test]
    fn test_nothing_found() {
        let content = ExtractedContent::text("Dear customer, thank you.".to_string(), Some(1));
        let result = HeuristicFigureExtractor::default().extract(&content, DocumentCategory::Sales);
        assert!(result.candidate.is_none());
        assert!(result.warnings.is_empty());
    }
}
