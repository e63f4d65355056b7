//! Retrieval-augmented question answering over a document portfolio.
//!
//! This crate provides:
//! - PDF and plain-text corpus extraction
//! - Overlapping, boundary-aware text chunking
//! - A persisted flat vector index with cosine or L2 ranking
//! - Gemini embedding and generation backends
//! - Persona prompt rendering and keyword classification of answers
//! - An [`Orchestrator`] tying the above into a build-once, ask-many service

pub mod chunking;
pub mod classifier;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod index;
pub mod orchestrator;
pub mod prompt;
pub mod synthesis;

pub use chunking::Chunker;
pub use classifier::{Category, ResponseClassifier, Rule};
pub use config::{AppConfig, AppConfigBuilder};
pub use document::{Answer, Chunk, Document, RetrievalResult, SearchHit};
pub use embedding::EmbeddingProvider;
pub use error::{AnswerStage, RagError, Result, ServiceFailure};
pub use extract::{PageExtractor, PdfExtractor, PlainTextExtractor, TextExtractor};
pub use gemini::{GeminiClient, GeminiEmbeddingProvider, GeminiGenerator};
pub use index::{DistanceMetric, IndexEntry, VectorIndex};
pub use orchestrator::{IndexStatus, Orchestrator, OrchestratorBuilder};
pub use prompt::{PromptTemplate, PromptVars};
pub use synthesis::{AnswerSynthesizer, GenerationRequest, TextGenerator};
