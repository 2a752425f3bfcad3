//! Configuration structures for the extraction pipeline.
//!
//! A `PipelineConfig` is a snapshot: the batch coordinator takes it at
//! construction time and nothing inside the pipeline reads process-wide
//! state afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upload size limit (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Main configuration for the vatx pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upload validation limits.
    pub limits: LimitsConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Spreadsheet/CSV processing configuration.
    pub tabular: TabularConfig,

    /// AI figure extraction configuration.
    pub ai: AiConfig,

    /// Heuristic figure extraction configuration.
    pub heuristic: HeuristicConfig,

    /// Candidate reconciliation configuration.
    pub reconcile: ReconcileConfig,

    /// Batch scheduling configuration.
    pub batch: BatchConfig,
}

/// Upload validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted file size in bytes.
    pub max_file_size_bytes: u64,

    /// Accepted file extensions (lowercase, without dot).
    pub allowed_extensions: Vec<String>,

    /// Check leading magic bytes against the extension.
    pub verify_signature: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: ["pdf", "csv", "xlsx", "xls", "jpg", "jpeg", "png"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            verify_signature: true,
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Hard deadline for parsing one PDF, in milliseconds.
    pub timeout_ms: u64,

    /// Maximum pages to read; later pages are skipped.
    pub max_pages: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_pages: 50,
        }
    }
}

/// Spreadsheet/CSV processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    /// Hard deadline for parsing one spreadsheet, in milliseconds.
    pub timeout_ms: u64,

    /// How many leading rows are searched for the header row.
    pub header_scan_rows: usize,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            header_scan_rows: 20,
        }
    }
}

/// AI figure extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Whether the AI path runs at all.
    pub enabled: bool,

    /// Ollama API endpoint.
    pub endpoint: String,

    /// Model name (must be vision-capable for image documents).
    pub model: String,

    /// Hard deadline for one AI request, in milliseconds.
    pub timeout_ms: u64,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum characters of document text sent in the prompt.
    pub max_content_chars: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            timeout_ms: 45_000,
            temperature: 0.1,
            max_content_chars: 12_000,
        }
    }
}

/// Heuristic figure extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Absolute tolerance for totals cross-checks (currency units).
    pub totals_tolerance: Decimal,

    /// Confidence when a cross-check passed.
    pub verified_confidence: f32,

    /// Confidence when no cross-check passed.
    pub unverified_confidence: f32,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            totals_tolerance: Decimal::new(1, 2),
            verified_confidence: 0.6,
            unverified_confidence: 0.3,
        }
    }
}

/// Candidate reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// AI confidence at or above which the AI candidate is trusted outright.
    pub high_confidence: f32,

    /// Relative agreement tolerance, in percent.
    pub agreement_tolerance_percent: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            high_confidence: 0.8,
            agreement_tolerance_percent: Decimal::ONE,
        }
    }
}

/// Batch scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Documents processed concurrently.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), crate::VatxError> {
        let bad = |msg: &str| Err(crate::VatxError::Config(msg.to_string()));

        if self.limits.allowed_extensions.is_empty() {
            return bad("limits.allowed_extensions must not be empty");
        }
        if self.pdf.timeout_ms == 0 || self.ai.timeout_ms == 0 || self.tabular.timeout_ms == 0 {
            return bad("timeouts must be greater than zero");
        }
        if self.pdf.max_pages == 0 {
            return bad("pdf.max_pages must be at least 1");
        }
        if self.batch.max_concurrency == 0 {
            return bad("batch.max_concurrency must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.reconcile.high_confidence) {
            return bad("reconcile.high_confidence must be within 0.0..=1.0");
        }
        if self.heuristic.totals_tolerance.is_sign_negative()
            || self.reconcile.agreement_tolerance_percent.is_sign_negative()
        {
            return bad("tolerances must not be negative");
        }
        Ok(())
    }
}

impl PdfConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TabularConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.limits.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pdf.max_pages, 50);
        assert_eq!(config.pdf.timeout_ms, 30_000);
        assert!(!config.ai.enabled);
        assert_eq!(config.heuristic.totals_tolerance, Decimal::new(1, 2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "ai": { "enabled": true, "timeout_ms": 5000 }, "pdf": { "max_pages": 3 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert!(config.ai.enabled);
        assert_eq!(config.ai.timeout_ms, 5000);
        assert_eq!(config.ai.endpoint, "http://localhost:11434");
        assert_eq!(config.pdf.max_pages, 3);
        assert_eq!(config.pdf.timeout_ms, 30_000);
        assert_eq!(config.batch.max_concurrency, 4);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = PipelineConfig::default();
        config.batch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = PipelineConfig::default();
        config.limits.max_file_size_bytes = 1024;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.limits.max_file_size_bytes, 1024);
    }
}
