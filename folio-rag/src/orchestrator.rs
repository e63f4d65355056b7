//! Question-answering orchestrator.
//!
//! The [`Orchestrator`] owns the index lifecycle and the per-question path:
//!
//! - [`prepare`](Orchestrator::prepare) loads the persisted index, or runs
//!   extract → chunk → embed → build → save when it is missing or unusable.
//! - [`ask`](Orchestrator::ask) runs embed → query → generate → classify.
//!
//! # Example
//!
//! ```rust,ignore
//! use folio_rag::{AppConfig, Orchestrator};
//!
//! let orchestrator = Orchestrator::builder()
//!     .config(AppConfig::from_env()?)
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(generator))
//!     .build()?;
//!
//! orchestrator.prepare().await?;
//! println!("{}", orchestrator.respond("What projects has she shipped?").await);
//! ```

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task;
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::classifier::ResponseClassifier;
use crate::config::AppConfig;
use crate::document::{Answer, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{AnswerStage, RagError, Result};
use crate::extract::TextExtractor;
use crate::index::{DistanceMetric, VectorIndex};
use crate::prompt::PromptTemplate;
use crate::synthesis::{AnswerSynthesizer, TextGenerator};

/// How [`Orchestrator::prepare`] obtained the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Loaded from the index directory.
    Loaded {
        /// Number of indexed chunks.
        entries: usize,
    },
    /// Built from the corpus and persisted.
    Built {
        /// Number of indexed chunks.
        entries: usize,
    },
}

impl IndexStatus {
    /// Number of indexed chunks.
    pub fn entries(&self) -> usize {
        match self {
            IndexStatus::Loaded { entries } | IndexStatus::Built { entries } => *entries,
        }
    }
}

/// Coordinates ingestion, indexing and answering.
///
/// The index is built or loaded once and then shared read-only by every
/// question. Construct one via [`Orchestrator::builder()`].
pub struct Orchestrator {
    config: AppConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    extractor: Arc<TextExtractor>,
    chunker: Chunker,
    synthesizer: AnswerSynthesizer,
    classifier: ResponseClassifier,
    metric: DistanceMetric,
    index: RwLock<Option<Arc<VectorIndex>>>,
}

impl Orchestrator {
    /// Create a new [`OrchestratorBuilder`].
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns `true` once an index is held in memory.
    pub async fn is_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Load the persisted index, rebuilding it if it is missing, corrupt or
    /// was built with a different embedding dimensionality.
    ///
    /// # Errors
    ///
    /// Returns the rebuild error (for example [`RagError::EmptyCorpus`] or an
    /// embedding failure), or any load error that a rebuild cannot fix.
    pub async fn prepare(&self) -> Result<IndexStatus> {
        match self.load_from_disk().await {
            Ok(index) => {
                let entries = index.len();
                *self.index.write().await = Some(Arc::new(index));
                info!(entries, path = %self.config.index_dir.display(), "using persisted vector index");
                Ok(IndexStatus::Loaded { entries })
            }
            Err(e @ RagError::IndexNotFound { .. }) => {
                info!(reason = %e, "building vector index");
                self.rebuild().await
            }
            Err(e) if e.requires_rebuild() => {
                warn!(error = %e, "persisted vector index is unusable, rebuilding");
                self.rebuild().await
            }
            Err(e) => Err(e),
        }
    }

    /// Rebuild the index from the corpus and persist it, replacing any
    /// existing index on disk and in memory.
    ///
    /// Nothing is persisted unless every step succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyCorpus`] if no text could be extracted, the
    /// provider's [`RagError::EmbeddingError`] if any chunk fails to embed,
    /// or an I/O error if the index cannot be written.
    pub async fn rebuild(&self) -> Result<IndexStatus> {
        let extractor = Arc::clone(&self.extractor);
        let corpus_dir = self.config.corpus_dir.clone();
        let text = task::spawn_blocking(move || extractor.extract_dir(&corpus_dir))
            .await
            .map_err(join_error)??;

        let chunks = self.chunker.split(&text);
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus { path: self.config.corpus_dir.clone() });
        }
        info!(chunk_count = chunks.len(), "chunked corpus");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(error = %e, "embedding failed during index build");
            e
        })?;

        let index = VectorIndex::build_with_metric(&chunks, embeddings, self.metric)?;
        let expected = self.embedding_provider.dimensions();
        if index.dimensions() != expected {
            return Err(RagError::IndexBuildError(format!(
                "provider reports {expected} dimensions but returned {}",
                index.dimensions()
            )));
        }

        let index = Arc::new(index);
        let to_save = Arc::clone(&index);
        let index_dir = self.config.index_dir.clone();
        task::spawn_blocking(move || to_save.save(&index_dir)).await.map_err(join_error)??;

        let entries = index.len();
        *self.index.write().await = Some(index);
        info!(entries, "built vector index");
        Ok(IndexStatus::Built { entries })
    }

    /// Retrieve the chunks most relevant to `question`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidQuestion`] for blank input,
    /// [`RagError::IndexNotFound`] when no index is available, or
    /// [`RagError::GenerationFailed`] if the question cannot be embedded.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        let question = validate_question(question)?;
        let index = self.current_index().await?;

        let query = self.embedding_provider.embed(question).await.map_err(|e| {
            warn!(error = %e, "question embedding failed");
            RagError::GenerationFailed { stage: AnswerStage::Embedding, source: Box::new(e) }
        })?;

        index.query(&query, self.config.top_k)
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::retrieve`], plus [`RagError::GenerationFailed`] if
    /// the model call fails.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let retrieved = self.retrieve(question).await?;
        let question = question.trim();

        let text = self.synthesizer.answer(question, &retrieved).await.map_err(|e| {
            warn!(error = %e, "answer generation failed");
            RagError::GenerationFailed { stage: AnswerStage::Generation, source: Box::new(e) }
        })?;

        let category = self.classifier.classify(&text);
        info!(hits = retrieved.len(), %category, "answered question");
        Ok(Answer::new(text, category))
    }

    /// Answer `question` for display. Failures become a readable message.
    pub async fn respond(&self, question: &str) -> String {
        match self.ask(question).await {
            Ok(answer) => answer.to_string(),
            Err(e) => {
                if !matches!(e, RagError::InvalidQuestion(_)) {
                    warn!(error = %e, "question could not be answered");
                }
                e.user_message()
            }
        }
    }

    async fn current_index(&self) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let index = Arc::new(self.load_from_disk().await?);
        *self.index.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn load_from_disk(&self) -> Result<VectorIndex> {
        let index_dir = self.config.index_dir.clone();
        let dimensions = self.embedding_provider.dimensions();
        task::spawn_blocking(move || VectorIndex::load(&index_dir, dimensions))
            .await
            .map_err(join_error)?
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(RagError::InvalidQuestion("question is empty".to_string()));
    }
    Ok(question)
}

fn join_error(e: task::JoinError) -> RagError {
    RagError::PipelineError(format!("background task failed: {e}"))
}

/// Builder for constructing an [`Orchestrator`].
///
/// `config`, `embedding_provider` and `generator` are required. The prompt
/// template defaults to the file named by [`AppConfig::prompt_template`],
/// or the built-in persona when unset.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<AppConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    extractor: Option<TextExtractor>,
    classifier: Option<ResponseClassifier>,
    template: Option<PromptTemplate>,
    metric: DistanceMetric,
}

impl OrchestratorBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generative model.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the default PDF and plain-text extractor.
    pub fn extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the default classifier rules.
    pub fn classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set the prompt template, overriding the configured file.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Set the distance metric used for newly built indexes.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Build the [`Orchestrator`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configured template is invalid, [`RagError::ChunkingError`] for
    /// invalid chunk settings, or [`RagError::Io`] if the template file
    /// cannot be read.
    pub fn build(self) -> Result<Orchestrator> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;

        let template = match (self.template, &config.prompt_template) {
            (Some(template), _) => template,
            (None, Some(path)) => PromptTemplate::from_file(path)?,
            (None, None) => PromptTemplate::default(),
        };

        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let synthesizer = AnswerSynthesizer::new(generator, config.subject_name.clone(), config.temperature)
            .with_template(template);

        Ok(Orchestrator {
            embedding_provider,
            extractor: Arc::new(self.extractor.unwrap_or_default()),
            chunker,
            synthesizer,
            classifier: self.classifier.unwrap_or_default(),
            metric: self.metric,
            index: RwLock::new(None),
            config,
        })
    }
}
