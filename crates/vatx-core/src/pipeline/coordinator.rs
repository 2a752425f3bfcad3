//! Batch coordinator: validation, hashing, extraction, reconciliation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, VatxError};
use crate::extract::{FormatExtractor, FormatExtractors};
use crate::figures::ai::{AiBackend, AiFigureExtractor, AiResult};
use crate::figures::heuristic::{HeuristicFigureExtractor, HeuristicResult};
use crate::hash::{ContentHash, IntegrityHasher};
use crate::models::config::PipelineConfig;
use crate::models::document::{DocumentCategory, ExtractedContent, RawDocument};
use crate::models::figures::{
    BatchResult, ExtractionOutcome, Figures, OutcomeStatus, Warning, WarningKind,
};
use crate::reconcile::Reconciler;
use crate::validate::FileValidator;

/// Builder for [`BatchCoordinator`].
pub struct BatchCoordinatorBuilder {
    config: PipelineConfig,
    extractors: FormatExtractors,
    ai_backend: Option<Arc<dyn AiBackend>>,
}

impl BatchCoordinatorBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        let extractors = FormatExtractors::from_config(&config);
        Self {
            config,
            extractors,
            ai_backend: None,
        }
    }

    /// Add an extractor that takes precedence over the built-in ones.
    pub fn with_extractor(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.extractors.register(extractor);
        self
    }

    /// Replace the whole extractor registry.
    pub fn with_extractors(mut self, extractors: FormatExtractors) -> Self {
        self.extractors = extractors;
        self
    }

    /// Use this AI backend instead of the configured Ollama endpoint.
    /// Ignored while `ai.enabled` is false.
    pub fn with_ai_backend(mut self, backend: Arc<dyn AiBackend>) -> Self {
        self.ai_backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<BatchCoordinator, VatxError> {
        self.config.validate()?;

        let ai = if self.config.ai.enabled {
            let backend = match self.ai_backend {
                Some(backend) => backend,
                None => default_backend(&self.config)?,
            };
            Some(Arc::new(AiFigureExtractor::new(self.config.ai.clone(), backend)))
        } else {
            None
        };

        Ok(BatchCoordinator {
            validator: FileValidator::new(self.config.limits.clone()),
            hasher: IntegrityHasher::new(),
            extractors: self.extractors,
            ai,
            heuristic: Arc::new(HeuristicFigureExtractor::new(self.config.heuristic.clone())),
            reconciler: Reconciler::new(self.config.reconcile.clone()),
            config: Arc::new(self.config),
        })
    }
}

#[cfg(feature = "ai")]
fn default_backend(config: &PipelineConfig) -> Result<Arc<dyn AiBackend>, VatxError> {
    let backend = crate::figures::ai::OllamaBackend::from_config(&config.ai)?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "ai"))]
fn default_backend(_config: &PipelineConfig) -> Result<Arc<dyn AiBackend>, VatxError> {
    Err(VatxError::Config(
        "ai.enabled is set but this build has no AI backend (enable the `ai` feature)".to_string(),
    ))
}

/// Drives documents through the pipeline.
///
/// Each coordinator owns a snapshot of its configuration. Documents are
/// independent: a failure produces a `Failed` outcome for that document and
/// never aborts its siblings. Dropping a `process_batch` future cancels the
/// in-flight work; extraction already running on a blocking thread finishes
/// in the background and its result is discarded.
pub struct BatchCoordinator {
    config: Arc<PipelineConfig>,
    validator: FileValidator,
    hasher: IntegrityHasher,
    extractors: FormatExtractors,
    ai: Option<Arc<AiFigureExtractor>>,
    heuristic: Arc<HeuristicFigureExtractor>,
    reconciler: Reconciler,
}

// What to do with one submitted document.
enum Plan {
    Rejected(ExtractionOutcome),
    Extract(RawDocument, ContentHash),
    Duplicate {
        doc: RawDocument,
        hash: ContentHash,
        original: usize,
    },
}

enum Step {
    Done(ExtractionOutcome),
    Duplicate {
        doc: RawDocument,
        hash: ContentHash,
        original: usize,
    },
}

impl BatchCoordinator {
    /// Coordinator with the built-in extractors and, if enabled, Ollama.
    pub fn new(config: PipelineConfig) -> Result<Self, VatxError> {
        Self::builder(config).build()
    }

    pub fn builder(config: PipelineConfig) -> BatchCoordinatorBuilder {
        BatchCoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    /// Process a batch; outcomes come back in submission order.
    pub async fn process_batch(&self, documents: Vec<RawDocument>) -> BatchResult {
        let start = Instant::now();
        let plans = self.plan(documents);

        let semaphore = Semaphore::new(self.config.batch.max_concurrency);
        let steps = join_all(plans.into_iter().map(|plan| {
            let semaphore = &semaphore;
            async move {
                match plan {
                    Plan::Rejected(outcome) => Step::Done(outcome),
                    Plan::Extract(doc, hash) => {
                        let _permit = semaphore.acquire().await.ok();
                        Step::Done(self.process_valid(&doc, hash).await)
                    }
                    Plan::Duplicate { doc, hash, original } => Step::Duplicate { doc, hash, original },
                }
            }
        }))
        .await;

        // Originals always come before their duplicates.
        let mut outcomes: Vec<ExtractionOutcome> = Vec::with_capacity(steps.len());
        for step in steps {
            let outcome = match step {
                Step::Done(outcome) => outcome,
                Step::Duplicate { doc, hash, original } => duplicate_outcome(&outcomes[original], &doc, hash),
            };
            outcomes.push(outcome);
        }

        let result = BatchResult::from_outcomes(outcomes);
        info!(
            "Processed {} documents in {:.2}s: {} succeeded, {} partial, {} failed; sales VAT {}, purchase VAT {}",
            result.summary.processed,
            start.elapsed().as_secs_f64(),
            result.summary.succeeded,
            result.summary.partial,
            result.summary.failed,
            result.totals.sales_vat,
            result.totals.purchase_vat
        );
        result
    }

    /// Process a single document.
    pub async fn process_document(&self, doc: &RawDocument) -> ExtractionOutcome {
        let hash = self.hasher.hash(doc.bytes());
        match self.check(doc, hash) {
            Some(rejected) => rejected,
            None => self.process_valid(doc, hash).await,
        }
    }

    // Validate and hash everything up front so duplicates can be spotted
    // before any extraction starts.
    fn plan(&self, documents: Vec<RawDocument>) -> Vec<Plan> {
        // The same bytes filed under another category are booked on their own.
        let mut seen: HashMap<(ContentHash, DocumentCategory), usize> = HashMap::new();
        let mut plans = Vec::with_capacity(documents.len());

        for (index, doc) in documents.into_iter().enumerate() {
            let hash = self.hasher.hash(doc.bytes());
            if let Some(rejected) = self.check(&doc, hash) {
                plans.push(Plan::Rejected(rejected));
                continue;
            }
            match seen.entry((hash, doc.category())) {
                Entry::Occupied(first) => {
                    debug!("{} duplicates document #{}", doc.file_name(), first.get());
                    plans.push(Plan::Duplicate {
                        doc,
                        hash,
                        original: *first.get(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                    plans.push(Plan::Extract(doc, hash));
                }
            }
        }
        plans
    }

    // Failed outcome for a document that does not pass validation.
    fn check(&self, doc: &RawDocument, hash: ContentHash) -> Option<ExtractionOutcome> {
        let validation = self.validator.validate(doc);
        let failure = validation.failure?;
        warn!("Rejected {}: {}", doc.file_name(), failure.message);
        Some(ExtractionOutcome::failed(
            doc.id(),
            doc.file_name(),
            failure.reason,
            failure.message,
            hash,
            Vec::new(),
        ))
    }

    async fn process_valid(&self, doc: &RawDocument, hash: ContentHash) -> ExtractionOutcome {
        let fail = |error: ExtractError, warnings: Vec<Warning>| {
            warn!("{}: {}", doc.file_name(), error);
            ExtractionOutcome::failed(doc.id(), doc.file_name(), error.reason(), error.to_string(), hash, warnings)
        };

        let extension = doc.extension().unwrap_or_default();
        let Some(extractor) = self.extractors.for_extension(&extension) else {
            return fail(ExtractError::UnsupportedFormat(extension), Vec::new());
        };

        let content = match self.run_extractor(extractor, doc).await {
            Ok(content) => content,
            Err(e) => return fail(e, Vec::new()),
        };

        let mut warnings = Vec::new();
        if content.truncated {
            warnings.push(Warning::new(
                WarningKind::PageLimitReached,
                format!(
                    "only the first {} of {} pages were read",
                    self.config.pdf.max_pages,
                    content.page_count.unwrap_or_default()
                ),
            ));
        }

        if content.requires_ai() && self.ai.is_none() {
            return fail(ExtractError::NoHeuristicPathForImage, warnings);
        }

        let content = Arc::new(content);
        let (ai, heuristic) = tokio::join!(
            self.run_ai(&content, doc.category()),
            self.run_heuristic(Arc::clone(&content), doc.category())
        );
        warnings.extend(ai.warnings);
        warnings.extend(heuristic.warnings);

        let reconciliation = self.reconciler.reconcile(ai.candidate, heuristic.candidate);
        warnings.extend(reconciliation.warnings);

        let Some(candidate) = reconciliation.candidate else {
            return fail(ExtractError::NoFiguresFound, warnings);
        };

        let status = if candidate.has_vat() {
            OutcomeStatus::Succeeded
        } else {
            OutcomeStatus::PartialFailure
        };
        debug!(
            "{}: {:?} from {} ({:?})",
            doc.file_name(),
            status,
            candidate.source,
            reconciliation.tier
        );

        ExtractionOutcome {
            document_id: doc.id().to_string(),
            file_name: doc.file_name().to_string(),
            status,
            failure_reason: None,
            failure_message: None,
            confidence_tier: reconciliation.tier,
            figures: Figures::from(candidate),
            warnings,
            content_hash: hash,
        }
    }

    async fn run_extractor(
        &self,
        extractor: Arc<dyn FormatExtractor>,
        doc: &RawDocument,
    ) -> Result<ExtractedContent, ExtractError> {
        let stage = extractor.name();
        let timeout = extractor.timeout();
        let doc = doc.clone();

        let task = tokio::task::spawn_blocking(move || extractor.extract(&doc));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExtractError::CorruptContent(format!(
                "{} extractor crashed: {}",
                stage, join_error
            ))),
            Err(_) => Err(ExtractError::ExtractionTimeout {
                stage,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn run_ai(&self, content: &ExtractedContent, category: DocumentCategory) -> AiResult {
        match &self.ai {
            Some(ai) => ai.extract(content, category).await,
            None => AiResult::default(),
        }
    }

    async fn run_heuristic(&self, content: Arc<ExtractedContent>, category: DocumentCategory) -> HeuristicResult {
        let heuristic = Arc::clone(&self.heuristic);
        tokio::task::spawn_blocking(move || heuristic.extract(&content, category))
            .await
            .unwrap_or_else(|e| {
                warn!("Heuristic extraction crashed: {}", e);
                HeuristicResult::default()
            })
    }
}

// Byte-identical resubmission: reuse the first document's figures but never
// count them twice.
fn duplicate_outcome(original: &ExtractionOutcome, doc: &RawDocument, hash: ContentHash) -> ExtractionOutcome {
    let warning = Warning::new(
        WarningKind::DuplicateContent,
        format!("same content as {}", original.document_id),
    );

    let mut outcome = original.clone();
    outcome.document_id = doc.id().to_string();
    outcome.file_name = doc.file_name().to_string();
    outcome.content_hash = hash;
    outcome.warnings = vec![warning];
    if outcome.status != OutcomeStatus::Failed {
        outcome.status = OutcomeStatus::PartialFailure;
    }
    outcome
}
