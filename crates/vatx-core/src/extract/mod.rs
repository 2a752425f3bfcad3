//! Format-specific content extraction.
//!
//! Each [`FormatExtractor`] turns the bytes of one document into
//! [`ExtractedContent`]. Extractors are synchronous; the pipeline runs them
//! on blocking threads under their [`FormatExtractor::timeout`].

mod image;
mod pdf;
mod tabular;

use std::sync::Arc;
use std::time::Duration;

pub use self::image::ImageExtractor;
pub use self::pdf::{LopdfProcessor, PdfProcessor, PdfText, PdfTextExtractor};
pub use self::tabular::{TabularExtractor, detect_structure};

use crate::error::ExtractError;
use crate::models::config::PipelineConfig;
use crate::models::document::{ExtractedContent, RawDocument};

/// Deadline for extractors that do not set their own.
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for format extractors.
pub trait FormatExtractor: Send + Sync {
    /// Stage name used in logs and timeout errors.
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the lowercase `extension`.
    fn supports(&self, extension: &str) -> bool;

    /// Extract content from a validated document.
    fn extract(&self, doc: &RawDocument) -> Result<ExtractedContent, ExtractError>;

    /// Deadline for one extraction.
    fn timeout(&self) -> Duration {
        DEFAULT_EXTRACTION_TIMEOUT
    }
}

/// Extractors in lookup order; the first that supports an extension wins.
#[derive(Clone)]
pub struct FormatExtractors {
    extractors: Vec<Arc<dyn FormatExtractor>>,
}

impl FormatExtractors {
    /// An empty registry.
    pub fn empty() -> Self {
        Self { extractors: Vec::new() }
    }

    /// PDF, tabular and image extractors configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            extractors: vec![
                Arc::new(PdfTextExtractor::new(config.pdf.clone())),
                Arc::new(TabularExtractor::new(config.tabular.clone())),
                Arc::new(ImageExtractor::new()),
            ],
        }
    }

    /// Register an extractor ahead of the existing ones.
    pub fn register(&mut self, extractor: Arc<dyn FormatExtractor>) {
        self.extractors.insert(0, extractor);
    }

    /// Extractor for a lowercase extension.
    pub fn for_extension(&self, extension: &str) -> Option<Arc<dyn FormatExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.supports(extension))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for FormatExtractors {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
