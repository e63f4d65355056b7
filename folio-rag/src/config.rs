//! Configuration for the question-answering pipeline.
//!
//! An [`AppConfig`] is constructed once at process start, either through the
//! [`AppConfigBuilder`] or from the environment, and handed to the
//! [`Orchestrator`](crate::Orchestrator).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Environment variable holding the Generative Language API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Default Generative Language REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration parameters for ingestion, indexing and answering.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Credential for both the embedding and the generation service.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Directory holding the source documents.
    pub corpus_dir: PathBuf,
    /// Directory holding the persisted vector index.
    pub index_dir: PathBuf,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Embedding model identifier, e.g. `models/embedding-001`.
    pub embedding_model: String,
    /// Dimensionality produced by `embedding_model`.
    pub embedding_dimensions: usize,
    /// Generative model identifier.
    pub generation_model: String,
    /// Sampling temperature for answer generation.
    pub temperature: f32,
    /// Upper bound on every external call.
    pub request_timeout: Duration,
    /// Base URL of the REST API.
    pub base_url: String,
    /// Name the persona speaks for.
    pub subject_name: String,
    /// Optional file replacing the built-in persona template.
    pub prompt_template: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            corpus_dir: PathBuf::from("assets"),
            index_dir: PathBuf::from("vector_index"),
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 5,
            embedding_model: "models/embedding-001".to_string(),
            embedding_dimensions: 768,
            generation_model: "models/gemma-3-1b-it".to_string(),
            temperature: 0.5,
            request_timeout: Duration::from_secs(60),
            base_url: DEFAULT_BASE_URL.to_string(),
            subject_name: "the candidate".to_string(),
            prompt_template: None,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("corpus_dir", &self.corpus_dir)
            .field("index_dir", &self.index_dir)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("top_k", &self.top_k)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("generation_model", &self.generation_model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("base_url", &self.base_url)
            .field("subject_name", &self.subject_name)
            .field("prompt_template", &self.prompt_template)
            .finish()
    }
}

impl AppConfig {
    /// Create a new builder for constructing an [`AppConfig`].
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Build a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `GOOGLE_API_KEY` is unset or any
    /// override fails to parse or validate.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Recognised variables: `GOOGLE_API_KEY` (required), `FOLIO_CORPUS_DIR`,
    /// `FOLIO_INDEX_DIR`, `FOLIO_CHUNK_SIZE`, `FOLIO_CHUNK_OVERLAP`,
    /// `FOLIO_TOP_K`, `FOLIO_EMBEDDING_MODEL`, `FOLIO_EMBEDDING_DIMENSIONS`,
    /// `FOLIO_GENERATION_MODEL`, `FOLIO_TEMPERATURE`,
    /// `FOLIO_REQUEST_TIMEOUT_SECS`, `FOLIO_BASE_URL`, `FOLIO_SUBJECT_NAME`,
    /// `FOLIO_PROMPT_TEMPLATE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RagError::ConfigError(format!("{API_KEY_ENV} not found in environment")))?;

        let mut builder = AppConfig::builder().api_key(api_key);

        if let Some(dir) = lookup("FOLIO_CORPUS_DIR") {
            builder = builder.corpus_dir(dir);
        }
        if let Some(dir) = lookup("FOLIO_INDEX_DIR") {
            builder = builder.index_dir(dir);
        }
        if let Some(size) = parse_var(&lookup, "FOLIO_CHUNK_SIZE")? {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = parse_var(&lookup, "FOLIO_CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(overlap);
        }
        if let Some(k) = parse_var(&lookup, "FOLIO_TOP_K")? {
            builder = builder.top_k(k);
        }
        if let Some(model) = lookup("FOLIO_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        if let Some(dims) = parse_var(&lookup, "FOLIO_EMBEDDING_DIMENSIONS")? {
            builder = builder.embedding_dimensions(dims);
        }
        if let Some(model) = lookup("FOLIO_GENERATION_MODEL") {
            builder = builder.generation_model(model);
        }
        if let Some(temperature) = parse_var(&lookup, "FOLIO_TEMPERATURE")? {
            builder = builder.temperature(temperature);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOLIO_REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(url) = lookup("FOLIO_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(name) = lookup("FOLIO_SUBJECT_NAME") {
            builder = builder.subject_name(name);
        }
        if let Some(path) = lookup("FOLIO_PROMPT_TEMPLATE") {
            builder = builder.prompt_template(path);
        }

        builder.build()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("invalid value for {key} ('{raw}'): {e}"))),
    }
}

/// Builder for constructing a validated [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the corpus directory.
    pub fn corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.corpus_dir = dir.into();
        self
    }

    /// Set the index directory.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the dimensionality produced by the embedding model.
    pub fn embedding_dimensions(mut self, dims: usize) -> Self {
        self.config.embedding_dimensions = dims;
        self
    }

    /// Set the generative model identifier.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the timeout applied to every external call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the REST API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the name the persona speaks for.
    pub fn subject_name(mut self, name: impl Into<String>) -> Self {
        self.config.subject_name = name.into();
        self
    }

    /// Replace the built-in persona template with the contents of a file.
    pub fn prompt_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.prompt_template = Some(path.into());
        self
    }

    /// Build the [`AppConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - the API key is empty
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embedding_dimensions == 0`
    /// - `temperature` is outside `0.0..=2.0`
    /// - `request_timeout` is zero
    pub fn build(self) -> Result<AppConfig> {
        let config = self.config;
        if config.api_key.trim().is_empty() {
            return Err(RagError::ConfigError(format!("{API_KEY_ENV} must not be empty")));
        }
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.embedding_dimensions == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be within 0.0..=2.0",
                config.temperature
            )));
        }
        if config.request_timeout.is_zero() {
            return Err(RagError::ConfigError("request_timeout must be non-zero".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains(API_KEY_ENV)));
    }

    #[test]
    fn defaults_follow_the_portfolio_setup() {
        let config = AppConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "key")])).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.corpus_dir, PathBuf::from("assets"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (API_KEY_ENV, "key"),
            ("FOLIO_TOP_K", "3"),
            ("FOLIO_TEMPERATURE", "0.2"),
            ("FOLIO_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let err =
            AppConfig::from_lookup(lookup_from(&[(API_KEY_ENV, "key"), ("FOLIO_TOP_K", "many")]))
                .unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("FOLIO_TOP_K")));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = AppConfig::builder().api_key("k").chunk_size(100).chunk_overlap(100).build();
        assert!(err.is_err());
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = AppConfig::builder().api_key("super-secret").build().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
