//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod output;
pub mod process;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use vatx_core::validate::mime_for_extension;
use vatx_core::{DocumentCategory, PipelineConfig, RawDocument};

/// Category flag shared by `process` and `batch`.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum CategoryArg {
    /// Sales invoices and marketplace reports
    Sales,
    /// Supplier invoices and receipts
    Purchases,
    /// Statements and anything else
    #[default]
    Other,
}

impl From<CategoryArg> for DocumentCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Sales => DocumentCategory::Sales,
            CategoryArg::Purchases => DocumentCategory::Purchases,
            CategoryArg::Other => DocumentCategory::Other,
        }
    }
}

/// `--ai` / `--no-ai` overrides.
#[derive(clap::Args, Clone, Copy, Debug, Default)]
pub struct AiFlags {
    /// Ask the configured AI model as well as the rule-based extractor
    #[arg(long, conflicts_with = "no_ai")]
    ai: bool,

    /// Rule-based extraction only
    #[arg(long)]
    no_ai: bool,
}

impl AiFlags {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if self.ai {
            config.ai.enabled = true;
        } else if self.no_ai {
            config.ai.enabled = false;
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vatx")
        .join("config.json")
}

/// `--config` if given, then the user config file, then defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PipelineConfig> {
    if let Some(path) = config_path {
        debug!("Loading config from {}", path);
        return Ok(PipelineConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Loading config from {}", default_path.display());
        Ok(PipelineConfig::from_file(&default_path)?)
    } else {
        Ok(PipelineConfig::default())
    }
}

/// Read a file from disk as an upload, declaring the MIME type its
/// extension implies.
pub fn read_document(path: &Path, category: DocumentCategory) -> anyhow::Result<RawDocument> {
    let bytes = fs::read(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    Ok(RawDocument::new(file_name, mime_for_extension(extension), category, bytes)
        .with_id(path.display().to_string()))
}
