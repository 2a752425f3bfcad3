//! Submitted documents and the intermediate content extracted from them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FailureReason;

/// Which side of the VAT return a document belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    /// Sales invoices, marketplace order reports (VAT on sales).
    Sales,
    /// Supplier invoices, receipts (VAT on purchases).
    Purchases,
    /// Statements and anything not declared.
    #[default]
    Other,
}

impl DocumentCategory {
    /// True when an unlabelled VAT figure should be booked as purchase VAT.
    pub fn is_purchase_side(&self) -> bool {
        matches!(self, DocumentCategory::Purchases)
    }
}

impl FromStr for DocumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sales" | "sale" | "sales_invoice" => Ok(DocumentCategory::Sales),
            "purchases" | "purchase" | "purchase_invoice" | "receipt" => {
                Ok(DocumentCategory::Purchases)
            }
            "other" | "" => Ok(DocumentCategory::Other),
            other => Err(format!("unknown document category: {}", other)),
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentCategory::Sales => "sales",
            DocumentCategory::Purchases => "purchases",
            DocumentCategory::Other => "other",
        };
        f.write_str(s)
    }
}

/// A document as submitted by the caller.
///
/// The byte buffer is shared, never copied or mutated, so the same bytes can
/// be hashed, parsed on a blocking thread and sent to the AI backend.
#[derive(Debug, Clone)]
pub struct RawDocument {
    id: String,
    file_name: String,
    declared_mime: String,
    category: DocumentCategory,
    bytes: Arc<[u8]>,
}

impl RawDocument {
    /// Create a document; its id defaults to the file name.
    pub fn new(
        file_name: impl Into<String>,
        declared_mime: impl Into<String>,
        category: DocumentCategory,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            id: file_name.clone(),
            file_name,
            declared_mime: declared_mime.into(),
            category,
            bytes: bytes.into(),
        }
    }

    /// Override the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn declared_mime(&self) -> &str {
        &self.declared_mime
    }

    pub fn category(&self) -> DocumentCategory {
        self.category
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercase extension of the declared file name.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// Outcome of the upload checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub detected_extension: Option<String>,
    pub failure: Option<ValidationFailure>,
}

/// Why a document was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl ValidationResult {
    pub fn valid(extension: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            detected_extension: Some(extension.into()),
            failure: None,
        }
    }

    pub fn invalid(
        extension: Option<String>,
        reason: FailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            is_valid: false,
            detected_extension: extension,
            failure: Some(ValidationFailure {
                reason,
                message: message.into(),
            }),
        }
    }

    /// Human-readable reason, if invalid.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}

/// Kind of extracted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Table,
}

/// A single spreadsheet/CSV cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(Decimal),
}

impl Cell {
    /// Build a cell from raw text, trimming whitespace.
    pub fn from_text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text view of the cell, `None` for empty and numeric cells.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, parsing text cells as currency amounts.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Number(d) => Some(*d),
            Cell::Text(s) => crate::figures::amounts::parse_amount(s),
            Cell::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(d) => write!(f, "{}", d),
        }
    }
}

/// Rows of a spreadsheet or CSV plus detected structure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableContent {
    /// All rows in file order.
    pub rows: Vec<Vec<Cell>>,
    /// Index of the header row, if one was recognised.
    pub header_row: Option<usize>,
    /// Indices of rows whose first cell reads like "Total".
    pub totals_rows: Vec<usize>,
}

impl TableContent {
    pub fn header(&self) -> Option<&[Cell]> {
        self.header_row.map(|i| self.rows[i].as_slice())
    }

    pub fn is_totals_row(&self, index: usize) -> bool {
        self.totals_rows.contains(&index)
    }

    /// Rows below the header that are not totals rows.
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        let start = self.header_row.map(|h| h + 1).unwrap_or(0);
        self.rows
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(i, row)| !self.is_totals_row(*i) && row.iter().any(|c| !c.is_empty()))
            .map(|(i, row)| (i, row.as_slice()))
    }

    /// Render as pipe-separated lines.
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Image bytes packaged for a vision-capable model.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Arc<[u8]>,
}

/// Format-specific intermediate content of one document.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub kind: ContentKind,
    pub text: Option<String>,
    pub table: Option<TableContent>,
    pub page_count: Option<u32>,
    pub image: Option<ImagePayload>,
    /// Pages were skipped because of the page limit.
    pub truncated: bool,
}

impl ExtractedContent {
    pub fn text(text: String, page_count: Option<u32>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(text),
            table: None,
            page_count,
            image: None,
            truncated: false,
        }
    }

    pub fn table(table: TableContent) -> Self {
        Self {
            kind: ContentKind::Table,
            text: None,
            table: Some(table),
            page_count: None,
            image: None,
            truncated: false,
        }
    }

    /// Empty text content carrying the image for the AI path.
    pub fn image(payload: ImagePayload) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(String::new()),
            table: None,
            page_count: Some(1),
            image: Some(payload),
            truncated: false,
        }
    }

    /// True when only a vision model can read this content.
    pub fn requires_ai(&self) -> bool {
        self.image.is_some() && self.text.as_deref().is_none_or(str::is_empty)
    }
}
