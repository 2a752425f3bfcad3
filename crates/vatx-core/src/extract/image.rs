//! Image documents: header check only, the pixels go to the AI backend.

use std::io::Cursor;

use ::image::ImageReader;
use tracing::debug;

use super::FormatExtractor;
use crate::error::ExtractError;
use crate::models::document::{ExtractedContent, ImagePayload, RawDocument};

/// Extractor for `.jpg`, `.jpeg` and `.png` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageExtractor;

impl ImageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FormatExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "jpg" | "jpeg" | "png")
    }

    fn extract(&self, doc: &RawDocument) -> Result<ExtractedContent, ExtractError> {
        let corrupt = |e: &dyn std::fmt::Display| ExtractError::CorruptContent(format!("image: {}", e));

        let reader = ImageReader::new(Cursor::new(doc.bytes()))
            .with_guessed_format()
            .map_err(|e| corrupt(&e))?;
        let format = reader
            .format()
            .ok_or_else(|| corrupt(&"unrecognised image format"))?;
        let (width, height) = reader.into_dimensions().map_err(|e| corrupt(&e))?;

        debug!("{}: {:?} image {}x{}", doc.file_name(), format, width, height);

        Ok(ExtractedContent::image(ImagePayload {
            mime: format.to_mime_type().to_string(),
            width,
            height,
            bytes: doc.shared_bytes(),
        }))
    }
}
