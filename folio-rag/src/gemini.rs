//! Gemini embedding and generation backends over the Generative Language REST API.
//!
//! Both backends share one [`GeminiClient`], which owns the HTTP connection
//! pool, the API key header and the per-request timeout. Every failure is
//! classified as [`ServiceFailure::Transient`] (timeouts, connection errors,
//! HTTP 408/429/5xx) or [`ServiceFailure::Fatal`] (everything else).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ServiceFailure};
use crate::synthesis::{GenerationRequest, TextGenerator};

const PROVIDER: &str = "Gemini";

/// Largest number of texts accepted by one `batchEmbedContents` call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Shared HTTP client for the Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    /// Create a client that authenticates with `api_key` and gives up on any
    /// call after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is not a valid header value
    /// or the HTTP client cannot be constructed.
    pub fn new(api_key: &str, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| RagError::ConfigError("API key contains invalid characters".to_string()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    /// Create a client from the key, base URL and timeout in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.api_key, config.base_url.clone(), config.request_timeout)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{model}:{method}", self.base_url)
    }

    #[instrument(skip(self, body))]
    async fn post<B, R>(&self, model: &str, method: &str, body: &B) -> std::result::Result<R, CallError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(model, method);
        let response = self.http.post(&url).json(body).send().await.map_err(CallError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(CallError::transport)?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(CallError {
                kind: classify_status(status),
                message: format!("API returned {status}: {detail}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| CallError {
            kind: ServiceFailure::Fatal,
            message: format!("failed to parse response: {e}"),
        })
    }
}

/// Prefix bare model names with `models/`.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn classify_status(status: StatusCode) -> ServiceFailure {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ServiceFailure::Transient
    } else {
        ServiceFailure::Fatal
    }
}

/// A failed call, before it is attributed to embedding or generation.
#[derive(Debug)]
struct CallError {
    kind: ServiceFailure,
    message: String,
}

impl CallError {
    fn transport(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            ServiceFailure::Transient
        } else {
            ServiceFailure::Fatal
        };
        error!(provider = PROVIDER, error = %e, "request failed");
        Self { kind, message: format!("request failed: {e}") }
    }

    fn fatal(message: impl Into<String>) -> Self {
        Self { kind: ServiceFailure::Fatal, message: message.into() }
    }

    fn into_embedding_error(self) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), kind: self.kind, message: self.message }
    }

    fn into_model_error(self) -> RagError {
        RagError::ModelError { provider: PROVIDER.into(), kind: self.kind, message: self.message }
    }
}

// ── wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self { role, parts: vec![Part { text }] }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> std::result::Result<String, CallError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response.prompt_feedback.and_then(|f| f.block_reason);
        return Err(match reason {
            Some(reason) => CallError::fatal(format!("prompt blocked: {reason}")),
            None => CallError::fatal("response contained no candidates"),
        });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(CallError::fatal(format!("empty response (finish reason: {reason})")));
    }
    Ok(text)
}

// ── embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by `embedContent` / `batchEmbedContents`.
///
/// Questions are embedded with the `RETRIEVAL_QUERY` task type and corpus
/// chunks with `RETRIEVAL_DOCUMENT`. Vectors whose length differs from the
/// configured dimensionality are rejected.
///
/// # Example
///
/// ```rust,ignore
/// use folio_rag::gemini::{GeminiClient, GeminiEmbeddingProvider};
///
/// let client = GeminiClient::from_config(&config)?;
/// let provider = GeminiEmbeddingProvider::new(client, "models/embedding-001", 768);
/// let embedding = provider.embed("What databases has she used?").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: GeminiClient,
    model: String,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a provider for `model`, which must produce `dimensions`-long vectors.
    pub fn new(client: GeminiClient, model: impl AsRef<str>, dimensions: usize) -> Self {
        Self { client, model: model_path(model.as_ref()), dimensions }
    }

    /// Create a provider from the embedding settings in `config`.
    pub fn from_config(client: GeminiClient, config: &AppConfig) -> Self {
        Self::new(client, &config.embedding_model, config.embedding_dimensions)
    }

    fn check_dimensions(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.dimensions {
            return Err(CallError::fatal(format!(
                "expected {}-dimensional embedding, got {}",
                self.dimensions,
                values.len()
            ))
            .into_embedding_error());
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding query");

        let request = EmbedContentRequest {
            model: &self.model,
            content: Content::text(None, text),
            task_type: TaskType::RetrievalQuery,
        };
        let response: EmbedContentResponse = self
            .client
            .post(&self.model, "embedContent", &request)
            .await
            .map_err(CallError::into_embedding_error)?;

        self.check_dimensions(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let request = BatchEmbedContentsRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: &self.model,
                        content: Content::text(None, text),
                        task_type: TaskType::RetrievalDocument,
                    })
                    .collect(),
            };
            let response: BatchEmbedContentsResponse = self
                .client
                .post(&self.model, "batchEmbedContents", &request)
                .await
                .map_err(CallError::into_embedding_error)?;

            if response.embeddings.len() != batch.len() {
                return Err(CallError::fatal(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    response.embeddings.len()
                ))
                .into_embedding_error());
            }
            for embedding in response.embeddings {
                results.push(self.check_dimensions(embedding.values)?);
            }
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── generation ─────────────────────────────────────────────────────

/// A [`TextGenerator`] backed by `generateContent`.
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
}

impl GeminiGenerator {
    /// Create a generator for `model`.
    pub fn new(client: GeminiClient, model: impl AsRef<str>) -> Self {
        Self { client, model: model_path(model.as_ref()) }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), &request.prompt)],
            generation_config: GenerationConfig { temperature: request.temperature },
        };
        let response: GenerateContentResponse = self
            .client
            .post(&self.model, "generateContent", &body)
            .await
            .map_err(CallError::into_model_error)?;

        response_text(response).map_err(CallError::into_model_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn bare_model_names_get_the_models_prefix() {
        assert_eq!(model_path("embedding-001"), "models/embedding-001");
        assert_eq!(model_path("models/gemma-3-1b-it"), "models/gemma-3-1b-it");
    }

    #[test]
    fn endpoint_joins_model_and_method() {
        let client =
            GeminiClient::new("key", "https://example.test/v1beta/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("models/embedding-001", "embedContent"),
            "https://example.test/v1beta/models/embedding-001:embedContent"
        );
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ServiceFailure::Transient);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), ServiceFailure::Transient);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), ServiceFailure::Transient);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ServiceFailure::Fatal);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ServiceFailure::Fatal);
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Five years "},{"text":"in fintech."}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(response_text(response).unwrap(), "Five years in fintech.");
    }

    #[test]
    fn blocked_prompt_is_fatal() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        let err = response_text(response).unwrap_err();
        assert_eq!(err.kind, ServiceFailure::Fatal);
        assert!(err.message.contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let response = parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#);
        let err = response_text(response).unwrap_err();
        assert!(err.message.contains("MAX_TOKENS"));
    }

    #[test]
    fn embedding_requests_use_the_rest_field_names() {
        let request = EmbedContentRequest {
            model: "models/embedding-001",
            content: Content::text(None, "hello"),
            task_type: TaskType::RetrievalDocument,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
        assert!(json["content"].get("role").is_none());
    }

    #[test]
    fn wrong_length_embedding_is_rejected() {
        let client = GeminiClient::new("key", "http://localhost", Duration::from_secs(1)).unwrap();
        let provider = GeminiEmbeddingProvider::new(client, "embedding-001", 3);
        let err = provider.check_dimensions(vec![0.0; 4]).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingError { kind: ServiceFailure::Fatal, .. }));
    }
}
