//! Regex tables for VAT figure extraction from Irish documents.
//!
//! Labelled patterns share one shape: `label`, a short `gap` that may hold
//! punctuation, currency symbols or a rate such as "23%", then `amount`.

use lazy_static::lazy_static;
use regex::Regex;

// Amount with exactly two decimals, either separator style.
const AMOUNT: &str = r"-?\d{1,3}(?:[,.\u{00a0}]\d{3})+[.,]\d{2}|-?\d+[.,]\d{2}";

// Anything but digits and newlines, or a percentage.
const GAP: &str = r"(?:\d{1,2}(?:[.,]\d{1,2})?\s?%|[^\d\n]){0,40}?";

fn labelled(label: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)\b(?P<label>{})(?P<gap>{})(?P<amount>{})\b",
        label, GAP, AMOUNT
    ))
    .unwrap()
}

lazy_static! {
    // Output VAT
    pub static ref SALES_VAT: Regex = labelled(
        r"sales\s+vat|vat\s+on\s+sales|output\s+vat|vat\s+charged|vat\s+collected"
    );

    // Input VAT
    pub static ref PURCHASE_VAT: Regex = labelled(
        r"purchases?\s+vat|vat\s+on\s+purchases|input\s+vat|vat\s+paid|vat\s+reclaim(?:able|ed)?"
    );

    // "VAT", "Total VAT", "Tax amount"
    pub static ref GENERIC_VAT: Regex = labelled(
        r"(?:total\s+)?(?:vat|tax)(?:\s+(?:amount|total|due))?"
    );

    // Gross totals, longest labels first
    pub static ref TOTAL_AMOUNT: Regex = labelled(
        r"grand\s+total|total\s+incl(?:uding|\.)?\s+vat|total\s+(?:amount|due|payable)|amount\s+due|balance\s+due|invoice\s+total|total"
    );

    // Net of VAT
    pub static ref NET_AMOUNT: Regex = labelled(
        r"sub\s*-?\s*total|net\s+(?:amount|total|value)|total\s+(?:ex|excl\.?|excluding|before)\s+vat|goods\s+value|net"
    );

    // Qualifier right before a VAT label that means the figure is not VAT
    pub static ref NOT_VAT_QUALIFIER: Regex = Regex::new(
        r"(?i)\b(?:ex|excl\.?|excluding|before|net\s+of|incl\.?|including)\s*$"
    ).unwrap();

    // Mentions of tax inside a gap
    pub static ref MENTIONS_TAX: Regex = Regex::new(r"(?i)vat|tax").unwrap();

    // "Consulting services 23% 1,000.00"
    pub static ref LINE_ITEM: Regex = Regex::new(&format!(
        r"(?m)^[ \t]*(?P<desc>[^\n]*?[A-Za-z][^\n]*?)[ \t]+(?P<rate>23|13[.,]5|9|4[.,]8|0)[ \t]?%[ \t]+(?P<amount>{})[ \t]*$",
        AMOUNT
    )).unwrap();

    // Descriptions that are summary lines, not items
    pub static ref SUMMARY_DESCRIPTION: Regex = Regex::new(
        r"(?i)^\s*(?:total|sub\s*-?\s*total|net|vat|tax)\b"
    ).unwrap();

    // Table structure
    pub static ref HEADER_KEYWORD: Regex = Regex::new(r"(?i)tax|vat|amount|total").unwrap();
    pub static ref TAX_COLUMN: Regex = Regex::new(r"(?i)tax|vat").unwrap();
    pub static ref AMOUNT_COLUMN: Regex = Regex::new(r"(?i)total|amount").unwrap();
    pub static ref TOTALS_ROW: Regex = Regex::new(r"(?i)total").unwrap();

    // Column headers that mention VAT without holding VAT amounts
    pub static ref NET_OF_TAX: Regex = Regex::new(
        r"(?i)\b(?:ex|excl|excluding|before|net\s+of)\b"
    ).unwrap();
    pub static ref GROSS_OF_TAX: Regex = Regex::new(r"(?i)\b(?:inc|incl|including|gross)\b").unwrap();
    pub static ref TAX_ATTRIBUTE: Regex = Regex::new(
        r"(?i)\b(?:rate|no|number|code|id|reg|registration|type)\b|%"
    ).unwrap();

    // PDF parser errors caused by the runtime environment
    pub static ref PDF_ENVIRONMENT: Regex = Regex::new(
        r"(?i)no such file or directory|os error 2|file not found|cannot find the (?:file|path)"
    ).unwrap();
}
