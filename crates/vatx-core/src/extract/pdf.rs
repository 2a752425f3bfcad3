//! PDF text extraction using lopdf and pdf-extract.

use std::sync::Arc;
use std::time::Duration;

use lopdf::Document;
use tracing::{debug, trace};

use super::FormatExtractor;
use crate::error::{ExtractError, PdfError};
use crate::figures::patterns::PDF_ENVIRONMENT;
use crate::models::config::PdfConfig;
use crate::models::document::{ExtractedContent, RawDocument};

/// Text of the pages that were read.
#[derive(Debug, Clone, Default)]
pub struct PdfText {
    /// Text per page, first page first; at most `max_pages` entries.
    pub pages: Vec<String>,
    /// Number of pages in the document.
    pub page_count: u32,
}

/// Trait for PDF text backends.
pub trait PdfProcessor: Send + Sync {
    /// Extract the text of up to `max_pages` pages.
    fn extract_pages(&self, data: &[u8], max_pages: u32) -> Result<PdfText, PdfError>;
}

/// lopdf per-page extraction with a pdf-extract fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfProcessor;

impl LopdfProcessor {
    pub fn new() -> Self {
        Self
    }

    fn load(data: &[u8]) -> Result<(Document, Option<Vec<u8>>), PdfError> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes
            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            return Ok((doc, Some(decrypted)));
        }

        Ok((doc, None))
    }
}

impl PdfProcessor for LopdfProcessor {
    fn extract_pages(&self, data: &[u8], max_pages: u32) -> Result<PdfText, PdfError> {
        let (doc, decrypted) = Self::load(data)?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let page_count = page_numbers.len() as u32;
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        let mut pages: Vec<String> = page_numbers
            .iter()
            .take(max_pages as usize)
            .map(|&n| {
                doc.extract_text(&[n]).unwrap_or_else(|e| {
                    trace!("lopdf could not read page {}: {}", n, e);
                    String::new()
                })
            })
            .collect();

        if pages.iter().all(|p| p.trim().is_empty()) {
            debug!("lopdf found no text, falling back to pdf-extract");
            // pdf-extract always reads every page it is given.
            let pruned;
            let raw = if page_count > max_pages {
                pruned = first_pages(doc, &page_numbers, max_pages)?;
                pruned.as_slice()
            } else {
                decrypted.as_deref().unwrap_or(data)
            };
            pages = pdf_extract::extract_text_from_mem_by_pages(raw)
                .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
            pages.truncate(max_pages as usize);
        }

        debug!("Read {} of {} PDF pages", pages.len(), page_count);
        Ok(PdfText { pages, page_count })
    }
}

/// Re-save `doc` with only its first `max_pages` pages.
fn first_pages(mut doc: Document, page_numbers: &[u32], max_pages: u32) -> Result<Vec<u8>, PdfError> {
    let beyond: Vec<u32> = page_numbers.iter().skip(max_pages as usize).copied().collect();
    doc.delete_pages(&beyond);
    doc.prune_objects();

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| PdfError::Parse(format!("Failed to save first {} pages: {}", max_pages, e)))?;
    Ok(buf)
}

/// Extractor for `.pdf` documents.
pub struct PdfTextExtractor {
    config: PdfConfig,
    processor: Arc<dyn PdfProcessor>,
}

impl PdfTextExtractor {
    pub fn new(config: PdfConfig) -> Self {
        Self::with_processor(config, Arc::new(LopdfProcessor::new()))
    }

    /// Use a different PDF backend.
    pub fn with_processor(config: PdfConfig, processor: Arc<dyn PdfProcessor>) -> Self {
        Self { config, processor }
    }
}

impl FormatExtractor for PdfTextExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    fn extract(&self, doc: &RawDocument) -> Result<ExtractedContent, ExtractError> {
        let PdfText { pages, page_count } = self
            .processor
            .extract_pages(doc.bytes(), self.config.max_pages)
            .map_err(classify)?;

        let text = pages
            .iter()
            .map(|p| normalize_whitespace(p))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut content = ExtractedContent::text(text, Some(page_count));
        content.truncated = page_count > self.config.max_pages;
        if content.truncated {
            debug!(
                "{}: only the first {} of {} pages were read",
                doc.file_name(),
                self.config.max_pages,
                page_count
            );
        }
        Ok(content)
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

// A missing font map or CMap is a deployment fault, not a bad upload.
fn classify(err: PdfError) -> ExtractError {
    let message = err.to_string();
    if PDF_ENVIRONMENT.is_match(&message) {
        ExtractError::PdfEnvironment(message)
    } else {
        ExtractError::CorruptContent(message)
    }
}

/// Collapse runs of spaces per line and drop blank lines.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::DocumentCategory;
    use pretty_assertions::assert_eq;

    struct FixedPages {
        pages: Vec<&'static str>,
        page_count: u32,
    }

    impl PdfProcessor for FixedPages {
        fn extract_pages(&self, _data: &[u8], max_pages: u32) -> Result<PdfText, PdfError> {
            Ok(PdfText {
                pages: self.pages.iter().take(max_pages as usize).map(|p| p.to_string()).collect(),
                page_count: self.page_count,
            })
        }
    }

    struct Failing(&'static str);

    impl PdfProcessor for Failing {
        fn extract_pages(&self, _data: &[u8], _max_pages: u32) -> Result<PdfText, PdfError> {
            Err(PdfError::TextExtraction(self.0.to_string()))
        }
    }

    fn pdf_doc(bytes: Vec<u8>) -> RawDocument {
        RawDocument::new("invoice.pdf", "application/pdf", DocumentCategory::Sales, bytes)
    }

    /// Build a PDF with one Helvetica text line per page.
    fn make_test_pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Object, Stream};

        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", line);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_extracts_text_from_generated_pdf() {
        let extractor = PdfTextExtractor::new(PdfConfig::default());
        let bytes = make_test_pdf(&["Sales VAT 230.00"]);

        let content = extractor.extract(&pdf_doc(bytes)).unwrap();

        let text = content.text.unwrap();
        assert!(text.contains("Sales") || text.contains("230.00"), "got: {}", text);
        assert_eq!(content.page_count, Some(1));
        assert!(!content.truncated);
    }

    #[test]
    fn test_page_limit_truncates() {
        let config = PdfConfig {
            max_pages: 2,
            ..PdfConfig::default()
        };
        let extractor = PdfTextExtractor::new(config);
        let bytes = make_test_pdf(&["Page one", "Page two", "Page three"]);

        let content = extractor.extract(&pdf_doc(bytes)).unwrap();

        assert_eq!(content.page_count, Some(3));
        assert!(content.truncated);
    }

    #[test]
    fn test_first_pages_drops_the_rest() {
        let bytes = make_test_pdf(&["Page one", "Page two", "Page three", "Page four"]);
        let doc = Document::load_mem(&bytes).unwrap();
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        let pruned = first_pages(doc, &page_numbers, 2).unwrap();

        let reloaded = Document::load_mem(&pruned).unwrap();
        assert_eq!(reloaded.get_pages().len(), 2);
        assert!(reloaded.extract_text(&[1]).unwrap().contains("one"));
        assert!(pruned.len() < bytes.len());
    }

    #[test]
    fn test_fallback_respects_page_limit() {
        let config = PdfConfig {
            max_pages: 1,
            ..PdfConfig::default()
        };
        let extractor = PdfTextExtractor::new(config);
        // No text on any page, so lopdf comes back empty.
        let bytes = make_test_pdf(&["", "", ""]);

        let content = extractor.extract(&pdf_doc(bytes.clone())).unwrap();
        assert_eq!(content.page_count, Some(3));
        assert!(content.truncated);

        let text = LopdfProcessor::new().extract_pages(&bytes, 1).unwrap();
        assert_eq!(text.page_count, 3);
        assert!(text.pages.len() <= 1);
    }

    #[test]
    fn test_pages_are_joined_and_normalized() {
        let processor = FixedPages {
            pages: vec!["Net   amount\t 100.00\n\n\n", "  ", "VAT  23.00 "],
            page_count: 3,
        };
        let extractor = PdfTextExtractor::with_processor(PdfConfig::default(), Arc::new(processor));

        let content = extractor.extract(&pdf_doc(b"%PDF-1.4".to_vec())).unwrap();

        assert_eq!(content.text.as_deref(), Some("Net amount 100.00\n\nVAT 23.00"));
        assert!(!content.truncated);
    }

    #[test]
    fn test_corrupt_pdf() {
        let extractor = PdfTextExtractor::new(PdfConfig::default());
        let err = extractor.extract(&pdf_doc(b"%PDF-1.4 garbage".to_vec())).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptContent(_)), "got {:?}", err);
    }

    #[test]
    fn test_environment_faults_are_classified() {
        let extractor = PdfTextExtractor::with_processor(
            PdfConfig::default(),
            Arc::new(Failing("cmap/Adobe-Japan1: No such file or directory (os error 2)")),
        );
        let err = extractor.extract(&pdf_doc(b"%PDF-1.4".to_vec())).unwrap_err();
        assert!(matches!(err, ExtractError::PdfEnvironment(_)));

        let extractor = PdfTextExtractor::with_processor(
            PdfConfig::default(),
            Arc::new(Failing("unexpected end of stream")),
        );
        let err = extractor.extract(&pdf_doc(b"%PDF-1.4".to_vec())).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptContent(_)));
    }
}
