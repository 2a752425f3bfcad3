//! Error types for the vatx-core library.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the vatx library.
#[derive(Error, Debug)]
pub enum VatxError {
    /// Per-document extraction error.
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// AI backend error.
    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Terminal errors for a single document.
///
/// Any of these ends processing of the document with a `Failed` outcome;
/// none of them aborts the rest of the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// Extension, MIME type or content signature not acceptable.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// File exceeds the configured size limit.
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// Content could not be parsed in its declared format.
    #[error("corrupt content: {0}")]
    CorruptContent(String),

    /// The extraction stage exceeded its deadline.
    #[error("{stage} extraction timed out after {timeout_ms}ms")]
    ExtractionTimeout { stage: &'static str, timeout_ms: u64 },

    /// No extractor handles this format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image documents need the AI path, which is disabled.
    #[error("image documents require AI extraction, which is disabled")]
    NoHeuristicPathForImage,

    /// The PDF parser failed for an environmental reason (missing resource
    /// files and similar), not because of the user's file.
    #[error("PDF parser environment fault: {0}")]
    PdfEnvironment(String),

    /// Neither extractor produced usable figures.
    #[error("no VAT figures found")]
    NoFiguresFound,
}

impl ExtractError {
    /// Coarse failure kind reported on the outcome.
    pub fn reason(&self) -> FailureReason {
        match self {
            ExtractError::InvalidFormat(_) => FailureReason::InvalidFormat,
            ExtractError::TooLarge { .. } => FailureReason::TooLarge,
            ExtractError::CorruptContent(_) => FailureReason::CorruptContent,
            ExtractError::ExtractionTimeout { .. } => FailureReason::ExtractionTimeout,
            ExtractError::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            ExtractError::NoHeuristicPathForImage => FailureReason::NoHeuristicPathForImage,
            ExtractError::PdfEnvironment(_) => FailureReason::PdfEnvironment,
            ExtractError::NoFiguresFound => FailureReason::NoFiguresFound,
        }
    }
}

/// Failure kind attached to a `Failed` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureReason {
    InvalidFormat,
    TooLarge,
    CorruptContent,
    ExtractionTimeout,
    UnsupportedFormat,
    NoHeuristicPathForImage,
    PdfEnvironment,
    NoFiguresFound,
}

/// Errors from the AI figure backend.
///
/// These never fail a document on their own; the pipeline downgrades them
/// to warnings and falls back to the heuristic candidate.
#[derive(Error, Debug)]
pub enum AiError {
    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request exceeded the configured deadline.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend response envelope could not be read.
    #[error("invalid response: {0}")]
    Response(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Result type for the vatx library.
pub type Result<T> = std::result::Result<T, VatxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_reason() {
        assert_eq!(
            ExtractError::TooLarge { size: 20, limit: 10 }.reason(),
            FailureReason::TooLarge
        );
        assert_eq!(
            ExtractError::ExtractionTimeout { stage: "pdf", timeout_ms: 100 }.reason(),
            FailureReason::ExtractionTimeout
        );
        assert_eq!(
            ExtractError::NoHeuristicPathForImage.reason(),
            FailureReason::NoHeuristicPathForImage
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ExtractError::ExtractionTimeout { stage: "pdf", timeout_ms: 250 };
        assert_eq!(err.to_string(), "pdf extraction timed out after 250ms");

        let err: VatxError = ExtractError::NoFiguresFound.into();
        assert_eq!(err.to_string(), "extraction error: no VAT figures found");
    }
}
