//! Answer synthesis: prompt assembly and the generative model seam.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::RetrievalResult;
use crate::error::Result;
use crate::prompt::{FALLBACK_ANSWER, PromptTemplate, PromptVars};

/// Separator placed between retrieved chunks in the prompt context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The fully rendered prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A generative text model.
///
/// Failures must be reported as [`RagError::ModelError`](crate::RagError::ModelError)
/// carrying a [`ServiceFailure`](crate::ServiceFailure) kind.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Produce a completion for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Turns a question plus retrieved context into a model answer.
pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
    template: PromptTemplate,
    subject: String,
    temperature: f32,
}

impl AnswerSynthesizer {
    /// Create a synthesizer using the built-in persona template.
    pub fn new(generator: Arc<dyn TextGenerator>, subject: impl Into<String>, temperature: f32) -> Self {
        Self { generator, template: PromptTemplate::default(), subject: subject.into(), temperature }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Render the prompt for `question`. Chunks appear best first.
    pub fn build_prompt(&self, question: &str, retrieved: &RetrievalResult) -> String {
        let context = retrieved.texts().collect::<Vec<_>>().join(CONTEXT_SEPARATOR);
        self.template.render(&PromptVars {
            context: &context,
            question,
            subject: &self.subject,
            fallback: FALLBACK_ANSWER,
        })
    }

    /// Ask the model. Returns the raw model text.
    ///
    /// # Errors
    ///
    /// Propagates the generator's [`RagError::ModelError`](crate::RagError::ModelError).
    pub async fn answer(&self, question: &str, retrieved: &RetrievalResult) -> Result<String> {
        let prompt = self.build_prompt(question, retrieved);
        debug!(
            model = self.generator.model(),
            context_chunks = retrieved.len(),
            prompt_len = prompt.len(),
            "generating answer"
        );
        self.generator.generate(&GenerationRequest { prompt, temperature: self.temperature }).await
    }
}
