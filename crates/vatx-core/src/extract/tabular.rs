//! CSV and spreadsheet extraction.

use std::io::Cursor;
use std::time::Duration;

use calamine::{Data, Reader};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::debug;

use super::FormatExtractor;
use crate::error::ExtractError;
use crate::figures::patterns::{HEADER_KEYWORD, TOTALS_ROW};
use crate::models::config::TabularConfig;
use crate::models::document::{Cell, ExtractedContent, RawDocument, TableContent};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Extractor for `.csv`, `.xlsx` and `.xls` documents.
#[derive(Debug, Clone)]
pub struct TabularExtractor {
    config: TabularConfig,
}

impl TabularExtractor {
    pub fn new(config: TabularConfig) -> Self {
        Self { config }
    }

    fn read_csv(data: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| ExtractError::CorruptContent(format!("CSV: {}", e)))?;
            // Windows exports are not always UTF-8.
            rows.push(
                record
                    .iter()
                    .map(|field| Cell::from_text(&String::from_utf8_lossy(field)))
                    .collect(),
            );
        }
        Ok(rows)
    }

    fn read_workbook(data: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))
            .map_err(|e| ExtractError::CorruptContent(format!("spreadsheet: {}", e)))?;

        // First worksheet that has any content.
        for (name, range) in workbook.worksheets() {
            let rows: Vec<Vec<Cell>> = range
                .rows()
                .map(|row| row.iter().map(data_to_cell).collect())
                .collect();
            if rows.iter().flatten().any(|c| !c.is_empty()) {
                debug!("Reading worksheet '{}' ({} rows)", name, rows.len());
                return Ok(rows);
            }
        }
        Ok(Vec::new())
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Decimal::from_f64(*f).map(Cell::Number).unwrap_or(Cell::Empty),
        Data::Int(i) => Cell::Number(Decimal::from(*i)),
        other => Cell::from_text(&other.to_string()),
    }
}

/// Find the header row and totals rows of a table.
///
/// The header is the first row within `header_scan_rows` that has at least
/// two filled cells, one of which mentions tax, VAT, amount or total. A lone
/// title such as "VAT Transactions Report" is skipped. Totals rows are the
/// later rows whose first cell mentions "total".
pub fn detect_structure(rows: Vec<Vec<Cell>>, header_scan_rows: usize) -> TableContent {
    let header_row = rows.iter().take(header_scan_rows).position(|row| {
        row.iter().filter(|c| !c.is_empty()).count() >= 2
            && row
                .iter()
                .any(|c| c.as_text().is_some_and(|t| HEADER_KEYWORD.is_match(t)))
    });

    let first_data_row = header_row.map_or(0, |h| h + 1);
    let totals_rows = rows
        .iter()
        .enumerate()
        .skip(first_data_row)
        .filter(|(_, row)| {
            row.first()
                .and_then(Cell::as_text)
                .is_some_and(|t| TOTALS_ROW.is_match(t))
        })
        .map(|(i, _)| i)
        .collect();

    TableContent {
        rows,
        header_row,
        totals_rows,
    }
}

impl FormatExtractor for TabularExtractor {
    fn name(&self) -> &'static str {
        "tabular"
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "csv" | "xlsx" | "xls")
    }

    fn extract(&self, doc: &RawDocument) -> Result<ExtractedContent, ExtractError> {
        let rows = match doc.extension().as_deref() {
            Some("csv") => Self::read_csv(doc.bytes())?,
            Some("xlsx") | Some("xls") => Self::read_workbook(doc.bytes())?,
            other => {
                return Err(ExtractError::UnsupportedFormat(
                    other.unwrap_or("(none)").to_string(),
                ));
            }
        };

        let table = detect_structure(rows, self.config.header_scan_rows);
        debug!(
            "{}: {} rows, header {:?}, totals rows {:?}",
            doc.file_name(),
            table.rows.len(),
            table.header_row,
            table.totals_rows
        );
        Ok(ExtractedContent::table(table))
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}
