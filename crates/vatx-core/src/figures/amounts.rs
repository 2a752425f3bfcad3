//! Currency amount parsing for Irish and continental number formats.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse an amount such as "€1,234.56", "1.234,56", "(12.00)" or "-5".
///
/// Accepts an optional currency symbol or code, thousands separators and
/// accounting-style parentheses for negatives. Returns `None` for anything
/// that is not a single number.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let mut t = s.trim();
    let mut negative = false;

    if t.starts_with('(') && t.ends_with(')') && t.len() > 2 {
        negative = true;
        t = &t[1..t.len() - 1];
    }

    let t = t
        .trim()
        .trim_start_matches("EUR")
        .trim_end_matches("EUR")
        .trim_matches(|c: char| c == '€' || c == '£' || c == '$' || c.is_whitespace());

    let t = if let Some(rest) = t.strip_prefix('-') {
        negative = !negative;
        rest
    } else {
        t
    };
    let t = t.trim_start_matches(['€', '£', '$']).trim();

    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | ' ' | '\u{00a0}')) {
        return None;
    }
    if !t.chars().next()?.is_ascii_digit() {
        return None;
    }

    let cleaned: String = t.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = normalize_separators(&cleaned)?;

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

// Decide which of ',' and '.' is the decimal separator.
fn normalize_separators(cleaned: &str) -> Option<String> {
    let comma = cleaned.rfind(',');
    let dot = cleaned.rfind('.');

    let normalized = match (comma, dot) {
        // 1.234,56
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && decimals != 3 {
                // 12,5 or 1234,56
                cleaned.replace(',', ".")
            } else {
                // 1,234 or 1,234,567
                cleaned.replace(',', "")
            }
        }
        // 1.234.567
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        (None, Some(_)) => cleaned.to_string(),
        (None, None) => cleaned.to_string(),
    };

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Format amount as "€1,234.56".
pub fn format_euro(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs());
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(*c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}€{}.{}", sign, formatted, decimal_part)
}
