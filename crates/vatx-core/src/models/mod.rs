//! Data models for documents, figures and configuration.

pub mod config;
pub mod document;
pub mod figures;

pub use config::PipelineConfig;
pub use document::{Cell, ContentKind, DocumentCategory, ExtractedContent, RawDocument, TableContent, ValidationResult};
pub use figures::{
    BatchResult, BatchSummary, ConfidenceTier, ExtractionOutcome, FigureCandidate, Figures, LineItem,
    OutcomeStatus, VatRate, VatTotals, Warning, WarningKind,
};
