//! Model-assisted VAT figure extraction.
//!
//! The model is reached through [`AiBackend`]; [`OllamaBackend`] talks to a
//! local Ollama server. Every failure here is recoverable: transport errors
//! and timeouts become warnings, unreadable answers become a zero-confidence
//! candidate that reconciliation ignores.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AiError;
use crate::models::config::AiConfig;
use crate::models::document::{DocumentCategory, ExtractedContent};
use crate::models::figures::{CandidateSource, FigureCandidate, LineItem, VatRate, Warning, WarningKind};

use super::amounts::parse_amount;

/// Confidence assumed when the model does not report one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

const SYSTEM_PROMPT: &str = "You extract Irish VAT figures from business documents. \
Answer with a single JSON object and nothing else.";

/// One completion request.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    /// Raw image bytes, encoded by the backend as needed.
    pub images: Vec<Arc<[u8]>>,
    pub temperature: f32,
}

/// A text-completion service able to answer in JSON.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Run one completion and return the raw model output.
    async fn complete(&self, request: &AiRequest) -> Result<String, AiError>;
}

#[cfg(feature = "ai")]
pub use ollama::OllamaBackend;

#[cfg(feature = "ai")]
mod ollama {
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Serialize};

    use super::{AiBackend, AiRequest};
    use crate::error::AiError;
    use crate::models::config::AiConfig;

    /// Ollama HTTP client using `/api/generate`.
    pub struct OllamaBackend {
        base_url: String,
        client: reqwest::Client,
        timeout_ms: u64,
    }

    impl OllamaBackend {
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AiError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| AiError::Connection(e.to_string()))?;

            Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                client,
                timeout_ms: timeout.as_millis() as u64,
            })
        }

        pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
            Self::new(&config.endpoint, config.timeout())
        }
    }

    #[derive(Serialize)]
    struct GenerateRequest<'a> {
        model: &'a str,
        prompt: &'a str,
        system: &'a str,
        stream: bool,
        format: &'a str,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        images: Vec<String>,
        options: GenerateOptions,
    }

    #[derive(Serialize)]
    struct GenerateOptions {
        temperature: f32,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        response: String,
    }

    #[async_trait]
    impl AiBackend for OllamaBackend {
        fn name(&self) -> &str {
            "ollama"
        }

        async fn complete(&self, request: &AiRequest) -> Result<String, AiError> {
            let url = format!("{}/api/generate", self.base_url);
            let body = GenerateRequest {
                model: &request.model,
                prompt: &request.prompt,
                system: &request.system,
                stream: false,
                format: "json",
                images: request.images.iter().map(|b| STANDARD.encode(b)).collect(),
                options: GenerateOptions {
                    temperature: request.temperature,
                },
            };

            let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.timeout_ms)
                } else if e.is_connect() {
                    AiError::Connection(self.base_url.clone())
                } else {
                    AiError::Connection(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AiError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| AiError::Response(e.to_string()))?;

            Ok(parsed.response)
        }
    }
}

/// Result of an AI pass.
#[derive(Debug, Clone, Default)]
pub struct AiResult {
    pub candidate: Option<FigureCandidate>,
    pub warnings: Vec<Warning>,
}

/// Prompts a model for VAT figures and parses its JSON answer leniently.
pub struct AiFigureExtractor {
    config: AiConfig,
    backend: Arc<dyn AiBackend>,
}

impl AiFigureExtractor {
    pub fn new(config: AiConfig, backend: Arc<dyn AiBackend>) -> Self {
        Self { config, backend }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Ask the model for figures. Never fails; problems come back as warnings.
    pub async fn extract(&self, content: &ExtractedContent, category: DocumentCategory) -> AiResult {
        if !self.config.enabled {
            return AiResult::default();
        }

        let request = self.build_request(content, category);
        debug!(
            "Sending {} chars and {} image(s) to {}",
            request.prompt.len(),
            request.images.len(),
            self.backend.name()
        );

        let reply = match tokio::time::timeout(self.config.timeout(), self.backend.complete(&request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return unavailable(e),
            Err(_) => return unavailable(AiError::Timeout(self.config.timeout_ms)),
        };

        match parse_response(&reply) {
            Ok(candidate) => {
                debug!(
                    "AI candidate: sales={:?} purchase={:?} confidence={}",
                    candidate.sales_vat, candidate.purchase_vat, candidate.confidence
                );
                AiResult {
                    candidate: Some(candidate),
                    warnings: Vec::new(),
                }
            }
            Err(message) => {
                warn!("Malformed AI response: {}", message);
                AiResult {
                    candidate: Some(FigureCandidate::empty(CandidateSource::Ai)),
                    warnings: vec![Warning::new(WarningKind::AiResponseMalformed, message)],
                }
            }
        }
    }

    /// Build the prompt for one document.
    pub fn build_request(&self, content: &ExtractedContent, category: DocumentCategory) -> AiRequest {
        let mut images = Vec::new();
        let body = if let Some(table) = &content.table {
            format!("Spreadsheet rows (cells separated by '|'):\n{}", self.truncate(&table.to_text()))
        } else if let Some(image) = content.image.as_ref().filter(|_| content.requires_ai()) {
            images.push(Arc::clone(&image.bytes));
            format!("The document is the attached {} image.", image.mime)
        } else {
            format!("Document text:\n{}", self.truncate(content.text.as_deref().unwrap_or("")))
        };

        let prompt = format!(
            "Extract the VAT figures from this {category} document.\n\
             Reply with JSON of the form:\n\
             {{\"salesVat\": number|null, \"purchaseVat\": number|null, \"totalAmount\": number|null, \
             \"lineItems\": [{{\"description\": string, \"amount\": number, \"vatRate\": \"23%\"|\"13.5%\"|\"9%\"|\"4.8%\"|\"0%\"|null}}], \
             \"confidence\": number between 0 and 1}}\n\
             Use null for figures that are not on the document.\n\n{body}"
        );

        AiRequest {
            model: self.config.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            images,
            temperature: self.config.temperature,
        }
    }

    fn truncate(&self, text: &str) -> String {
        let max = self.config.max_content_chars;
        if text.chars().count() <= max {
            return text.to_string();
        }
        debug!("Truncating AI input to {} chars", max);
        text.chars().take(max).collect()
    }
}

fn unavailable(error: AiError) -> AiResult {
    warn!("AI extraction unavailable: {}", error);
    AiResult {
        candidate: None,
        warnings: vec![Warning::new(WarningKind::AiUnavailable, error.to_string())],
    }
}

/// A JSON number or a string such as "€1,230.00".
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(serde_json::Number),
    Text(String),
}

impl Lenient {
    fn amount(&self) -> Result<Option<Decimal>, String> {
        match self {
            Lenient::Number(n) => {
                let s = n.to_string();
                Decimal::from_str(&s)
                    .or_else(|_| Decimal::from_scientific(&s))
                    .map(|d| Some(d.round_dp(2)))
                    .map_err(|_| format!("amount '{}' is out of range", s))
            }
            Lenient::Text(s) if s.trim().is_empty() => Ok(None),
            Lenient::Text(s) => parse_amount(s)
                .map(|d| Some(d.round_dp(2)))
                .ok_or_else(|| format!("'{}' is not an amount", s)),
        }
    }

    fn confidence(&self) -> Option<f32> {
        match self {
            Lenient::Number(n) => n.as_f64().map(|v| v as f32),
            Lenient::Text(s) => s.trim().parse::<f32>().ok(),
        }
    }

    fn rate(&self) -> Option<VatRate> {
        match self {
            Lenient::Number(n) => VatRate::parse(&n.to_string()),
            Lenient::Text(s) => VatRate::parse(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiFigures {
    #[serde(default, alias = "sales_vat")]
    sales_vat: Option<Lenient>,
    #[serde(default, alias = "purchase_vat")]
    purchase_vat: Option<Lenient>,
    #[serde(default, alias = "total_amount")]
    total_amount: Option<Lenient>,
    #[serde(default, alias = "line_items")]
    line_items: Option<Vec<AiLineItem>>,
    #[serde(default)]
    confidence: Option<Lenient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiLineItem {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    amount: Option<Lenient>,
    #[serde(default, alias = "vat_rate")]
    vat_rate: Option<Lenient>,
}

// Models like to wrap JSON in Markdown fences or add a sentence around it.
fn json_body(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}

/// Parse a model answer into a candidate.
///
/// Errors describe why the answer is unusable and end up in an
/// `AiResponseMalformed` warning.
pub fn parse_response(raw: &str) -> Result<FigureCandidate, String> {
    let body = json_body(raw).ok_or_else(|| "response contains no JSON object".to_string())?;
    let figures: AiFigures =
        serde_json::from_str(body).map_err(|e| format!("response is not valid figure JSON: {}", e))?;

    let amount = |v: &Option<Lenient>| -> Result<Option<Decimal>, String> {
        match v {
            Some(v) => v.amount(),
            None => Ok(None),
        }
    };

    let mut candidate = FigureCandidate::empty(CandidateSource::Ai);
    candidate.sales_vat = amount(&figures.sales_vat)?;
    candidate.purchase_vat = amount(&figures.purchase_vat)?;
    candidate.total_amount = amount(&figures.total_amount)?;

    candidate.line_items = figures
        .line_items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let amount = item.amount.as_ref()?.amount().ok()??;
            Some(LineItem {
                description: item.description.unwrap_or_default().trim().to_string(),
                amount,
                vat_rate: item.vat_rate.as_ref().and_then(Lenient::rate),
            })
        })
        .collect();

    let confidence = figures
        .confidence
        .as_ref()
        .and_then(Lenient::confidence)
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE);

    Ok(candidate.with_confidence(confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Canned backend that records what it was asked.
    struct MockBackend {
        reply: Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
        last: Mutex<Option<AiRequest>>,
    }

    impl MockBackend {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok("{}".to_string()),
                delay,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl AiBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: &AiRequest) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(AiError::Connection)
        }
    }

    fn enabled() -> AiConfig {
        AiConfig {
            enabled: true,
            ..AiConfig::default()
        }
    }

    fn text(s: &str) -> ExtractedContent {
        ExtractedContent::text(s.to_string(), Some(1))
    }

    #[tokio::test]
    async fn test_disabled_makes_no_call() {
        let backend = MockBackend::replying("{\"salesVat\": 1}");
        let extractor = AiFigureExtractor::new(AiConfig::default(), backend.clone());

        let result = extractor.extract(&text("VAT 1.00"), DocumentCategory::Sales).await;

        assert!(result.candidate.is_none());
        assert!(result.warnings.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parses_candidate() {
        let backend = MockBackend::replying(
            r#"{"salesVat": "€1,230.50", "purchaseVat": null, "totalAmount": 6580.5,
                "lineItems": [{"description": "Consulting", "amount": 5350, "vatRate": "23%"}],
                "confidence": 0.92}"#,
        );
        let extractor = AiFigureExtractor::new(enabled(), backend.clone());

        let result = extractor.extract(&text("Invoice"), DocumentCategory::Sales).await;

        let candidate = result.candidate.unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(candidate.source, CandidateSource::Ai);
        assert_eq!(candidate.sales_vat, Some(dec("1230.50")));
        assert_eq!(candidate.purchase_vat, None);
        assert_eq!(candidate.total_amount, Some(dec("6580.50")));
        assert_eq!(candidate.line_items[0].vat_rate, Some(VatRate::Standard23));
        assert_eq!(candidate.confidence, 0.92);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_gives_zero_confidence() {
        let backend = MockBackend::replying("I could not find any VAT on this page.");
        let extractor = AiFigureExtractor::new(enabled(), backend);

        let result = extractor.extract(&text("Invoice"), DocumentCategory::Sales).await;

        let candidate = result.candidate.unwrap();
        assert_eq!(candidate.confidence, 0.0);
        assert!(!candidate.is_usable());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::AiResponseMalformed);
    }

    #[tokio::test]
    async fn test_backend_failure_is_a_warning() {
        let backend = MockBackend::failing("connection refused");
        let extractor = AiFigureExtractor::new(enabled(), backend);

        let result = extractor.extract(&text("Invoice"), DocumentCategory::Sales).await;

        assert!(result.candidate.is_none());
        assert_eq!(result.warnings[0].kind, WarningKind::AiUnavailable);
        assert!(result.warnings[0].message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_timeout_is_a_warning() {
        let config = AiConfig {
            timeout_ms: 50,
            ..enabled()
        };
        let extractor = AiFigureExtractor::new(config, MockBackend::slow(Duration::from_secs(5)));

        let result = extractor.extract(&text("Invoice"), DocumentCategory::Sales).await;

        assert!(result.candidate.is_none());
        assert_eq!(result.warnings[0].kind, WarningKind::AiUnavailable);
        assert!(result.warnings[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_image_is_attached() {
        use crate::models::document::ImagePayload;

        let backend = MockBackend::replying("{}");
        let extractor = AiFigureExtractor::new(enabled(), backend.clone());
        let content = ExtractedContent::image(ImagePayload {
            mime: "image/png".to_string(),
            width: 2,
            height: 2,
            bytes: Arc::from(vec![1u8, 2, 3]),
        });

        extractor.extract(&content, DocumentCategory::Purchases).await;

        let request = backend.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.images.len(), 1);
        assert_eq!(&*request.images[0], &[1u8, 2, 3][..]);
        assert!(request.prompt.contains("purchases document"));
        assert!(request.prompt.contains("attached image/png image"));
    }

    #[test]
    fn test_text_is_truncated() {
        let config = AiConfig {
            max_content_chars: 10,
            ..enabled()
        };
        let extractor = AiFigureExtractor::new(config, MockBackend::replying("{}"));
        let request = extractor.build_request(&text(&"x".repeat(50)), DocumentCategory::Sales);

        assert!(request.prompt.ends_with(&"x".repeat(10)));
        assert!(!request.prompt.contains(&"x".repeat(11)));
    }

    #[test]
    fn test_parse_fenced_response_defaults_confidence() {
        let raw = "```json\n{\"purchaseVat\": 45.1}\n```";
        let candidate = parse_response(raw).unwrap();

        assert_eq!(candidate.purchase_vat, Some(dec("45.10")));
        assert_eq!(candidate.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_parse_clamps_confidence() {
        assert_eq!(parse_response("{\"salesVat\": 1, \"confidence\": 1.7}").unwrap().confidence, 1.0);
        assert_eq!(parse_response("{\"salesVat\": 1, \"confidence\": -2}").unwrap().confidence, 0.0);
        assert_eq!(parse_response("{\"salesVat\": 1, \"confidence\": \"0.7\"}").unwrap().confidence, 0.7);
    }

    #[test]
    fn test_parse_rejects_bad_amounts() {
        assert!(parse_response("{\"salesVat\": \"lots\"}").is_err());
        assert!(parse_response("{\"salesVat\": true}").is_err());
        assert!(parse_response("[1, 2]").is_err());
        assert!(parse_response("").is_err());
    }

    #[test]
    fn test_text_and_number_amounts_round_alike() {
        let from_text = parse_response("{\"salesVat\": \"230.005\", \"totalAmount\": \"€1,230.129\"}").unwrap();
        let from_number = parse_response("{\"salesVat\": 230.005, \"totalAmount\": 1230.129}").unwrap();

        assert_eq!(from_text.sales_vat, from_number.sales_vat);
        assert_eq!(from_text.sales_vat, Some(dec("230.00")));
        assert_eq!(from_text.total_amount, Some(dec("1230.13")));
        assert_eq!(from_number.total_amount, Some(dec("1230.13")));
    }

    #[test]
    fn test_parse_snake_case_keys() {
        let candidate = parse_response("{\"sales_vat\": \"230.00\", \"total_amount\": \"1,230.00\"}").unwrap();
        assert_eq!(candidate.sales_vat, Some(dec("230.00")));
        assert_eq!(candidate.total_amount, Some(dec("1230.00")));
    }
}
