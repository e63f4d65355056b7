//! Error types for the `folio-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Whether a failed call to an external service is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFailure {
    /// Timeouts, rate limiting, connection resets and server-side errors.
    Transient,
    /// Rejected requests, malformed responses and anything else a retry will not fix.
    Fatal,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceFailure::Transient => f.write_str("transient"),
            ServiceFailure::Fatal => f.write_str("fatal"),
        }
    }
}

/// The step of the per-question path that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStage {
    /// Embedding the question.
    Embedding,
    /// Calling the generative model.
    Generation,
}

impl fmt::Display for AnswerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerStage::Embedding => f.write_str("question embedding"),
            AnswerStage::Generation => f.write_str("answer generation"),
        }
    }
}

/// Errors that can occur while ingesting, indexing or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// The corpus directory is missing or yielded no extractable text.
    #[error("Empty corpus: no extractable text found in '{}'", path.display())]
    EmptyCorpus {
        /// The corpus directory that was scanned.
        path: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An error occurred during text chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// No persisted index exists at the expected location.
    #[error("Index not found at '{}'", path.display())]
    IndexNotFound {
        /// The index directory that was checked.
        path: PathBuf,
    },

    /// The persisted index exists but cannot be decoded.
    #[error("Corrupt index at '{}': {message}", path.display())]
    CorruptIndex {
        /// The index directory that was read.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The index and the embedding model disagree on dimensionality.
    #[error("Incompatible index: expected {expected}-dimensional embeddings, found {found}")]
    IncompatibleIndex {
        /// Dimensionality produced by the current embedding model.
        expected: usize,
        /// Dimensionality stored in (or queried against) the index.
        found: usize,
    },

    /// The inputs to an index build were inconsistent.
    #[error("Index build error: {0}")]
    IndexBuildError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}, {kind}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// Whether the failure is retryable.
        kind: ServiceFailure,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while calling the generative model.
    #[error("Model error ({provider}, {kind}): {message}")]
    ModelError {
        /// The generation provider that produced the error.
        provider: String,
        /// Whether the failure is retryable.
        kind: ServiceFailure,
        /// A description of the failure.
        message: String,
    },

    /// The question was empty or whitespace.
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    /// Answering a single question failed; the process stays servable.
    #[error("Generation failed during {stage}: {source}")]
    GenerationFailed {
        /// The step that failed.
        stage: AnswerStage,
        /// The underlying service error.
        #[source]
        source: Box<RagError>,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the orchestration itself.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Build an [`RagError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io { path: path.into(), source }
    }

    /// Returns `true` when retrying the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::EmbeddingError { kind, .. } | RagError::ModelError { kind, .. } => {
                *kind == ServiceFailure::Transient
            }
            RagError::GenerationFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` for index load failures that are resolved by rebuilding.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            RagError::IndexNotFound { .. }
                | RagError::CorruptIndex { .. }
                | RagError::IncompatibleIndex { .. }
        )
    }

    /// Text shown to the person asking, in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            RagError::EmptyCorpus { .. } => {
                "⚠️ No portfolio documents could be read, so there is nothing to answer from."
                    .to_string()
            }
            RagError::IndexNotFound { .. } => {
                "⚠️ Vector store not found. Try restarting the app.".to_string()
            }
            RagError::CorruptIndex { .. } | RagError::IncompatibleIndex { .. } => {
                "⚠️ The vector store is unusable and must be rebuilt. Try restarting with --rebuild."
                    .to_string()
            }
            RagError::InvalidQuestion(_) => "🤔 Please ask a question.".to_string(),
            RagError::GenerationFailed { .. } if self.is_transient() => {
                "⏳ The AI service is busy right now. Please try again in a moment.".to_string()
            }
            RagError::GenerationFailed { stage, .. } => {
                format!("❌ Sorry, something went wrong during {stage}.")
            }
            other => format!("❌ {other}"),
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
