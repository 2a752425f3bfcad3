//! Upload validation: size, extension allow-list, MIME type, signature.

use tracing::debug;

use crate::error::FailureReason;
use crate::models::config::LimitsConfig;
use crate::models::document::{RawDocument, ValidationResult};

/// Expected MIME types per extension.
pub fn mime_types_for(extension: &str) -> &'static [&'static str] {
    match extension {
        "pdf" => &["application/pdf", "application/x-pdf"],
        "csv" => &[
            "text/csv",
            "application/csv",
            "text/plain",
            "application/vnd.ms-excel",
        ],
        "xlsx" => &[
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/octet-stream",
        ],
        "xls" => &["application/vnd.ms-excel", "application/octet-stream"],
        "jpg" | "jpeg" => &["image/jpeg", "image/jpg", "image/pjpeg"],
        "png" => &["image/png"],
        _ => &[],
    }
}

/// Canonical MIME type for an extension, for callers that only know the
/// file name.
pub fn mime_for_extension(extension: &str) -> &'static str {
    mime_types_for(&extension.to_lowercase())
        .first()
        .copied()
        .unwrap_or("application/octet-stream")
}

// Leading magic bytes per extension. CSV has none.
fn signature_matches(extension: &str, bytes: &[u8]) -> bool {
    match extension {
        "pdf" => find_pdf_header(bytes),
        "png" => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        "jpg" | "jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "xlsx" => bytes.starts_with(b"PK\x03\x04"),
        "xls" => bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
        _ => true,
    }
}

// Readers accept junk before the header within the first kilobyte.
fn find_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Checks an upload against the configured limits. Pure; fails closed.
#[derive(Debug, Clone)]
pub struct FileValidator {
    limits: LimitsConfig,
}

impl FileValidator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    pub fn validate(&self, doc: &RawDocument) -> ValidationResult {
        let extension = doc.extension();

        if doc.size() > self.limits.max_file_size_bytes {
            return ValidationResult::invalid(
                extension,
                FailureReason::TooLarge,
                format!(
                    "file is {} bytes, limit is {} bytes",
                    doc.size(),
                    self.limits.max_file_size_bytes
                ),
            );
        }

        if doc.size() == 0 {
            return ValidationResult::invalid(extension, FailureReason::InvalidFormat, "file is empty");
        }

        let Some(ext) = extension else {
            return ValidationResult::invalid(
                None,
                FailureReason::InvalidFormat,
                format!("file name '{}' has no extension", doc.file_name()),
            );
        };

        if !self.limits.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return ValidationResult::invalid(
                Some(ext.clone()),
                FailureReason::InvalidFormat,
                format!("extension '.{}' is not allowed", ext),
            );
        }

        let declared = normalize_mime(doc.declared_mime());
        if !mime_types_for(&ext).contains(&declared.as_str()) {
            return ValidationResult::invalid(
                Some(ext.clone()),
                FailureReason::InvalidFormat,
                format!("declared type '{}' does not match '.{}'", declared, ext),
            );
        }

        if self.limits.verify_signature && !signature_matches(&ext, doc.bytes()) {
            return ValidationResult::invalid(
                Some(ext.clone()),
                FailureReason::InvalidFormat,
                format!("content does not look like a .{} file", ext),
            );
        }

        debug!("Validated {} ({} bytes, .{})", doc.file_name(), doc.size(), ext);
        ValidationResult::valid(ext)
    }
}

// "Text/CSV; charset=utf-8" -> "text/csv"
fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_lowercase()
}
