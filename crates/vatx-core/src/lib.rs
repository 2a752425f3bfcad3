//! Core library for Irish VAT document extraction.
//!
//! This crate provides:
//! - Upload validation (size, extension, MIME type, content signature)
//! - SHA-256 content hashing for duplicate detection
//! - PDF, CSV/spreadsheet and image content extraction
//! - AI-assisted and rule-based VAT figure extraction
//! - Reconciliation of both into one result with a confidence tier
//! - Batch processing with bounded parallelism and per-stage timeouts

pub mod error;
pub mod extract;
pub mod figures;
pub mod hash;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod validate;

pub use error::{AiError, ExtractError, FailureReason, Result, VatxError};
pub use extract::{FormatExtractor, FormatExtractors};
pub use figures::{AiBackend, AiFigureExtractor, AiRequest, HeuristicFigureExtractor};
#[cfg(feature = "ai")]
pub use figures::OllamaBackend;
pub use hash::{ContentHash, IntegrityHasher};
pub use models::{
    BatchResult, BatchSummary, Cell, ConfidenceTier, DocumentCategory, ExtractedContent, ExtractionOutcome,
    FigureCandidate, Figures, LineItem, OutcomeStatus, PipelineConfig, RawDocument, TableContent, VatRate,
    VatTotals, Warning, WarningKind,
};
pub use pipeline::{BatchCoordinator, BatchCoordinatorBuilder};
pub use reconcile::{Reconciler, Reconciliation};
pub use validate::FileValidator;
