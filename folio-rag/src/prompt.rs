//! Persona prompt template.
//!
//! The template is plain text with `{name}` placeholders. `{context}` and
//! `{question}` are required; `{subject}` and `{fallback}` are optional.
//! Rendering is a single left-to-right pass, so placeholder-like text inside
//! substituted values is never expanded a second time.

use std::fs;
use std::path::Path;

use crate::error::{RagError, Result};

/// Reply the model is told to give when the context does not cover the question.
pub const FALLBACK_ANSWER: &str = "😅 I'd love to brag more, but this detail isn't in the portfolio!";

/// Version tag of [`PERSONA_TEMPLATE`].
pub const PERSONA_TEMPLATE_VERSION: u32 = 2;

/// Built-in persona template.
pub const PERSONA_TEMPLATE: &str = "\
You are a helpful and witty assistant who speaks on behalf of a software developer named {subject}.
Your job is to promote their skills, experience, and projects with confidence, charm, and solid context.
Use the given context to answer every question persuasively, whether it's about their skills, job fit, background, or accomplishments.

When asked whether {subject} is a good fit for a technology or role, use the context to explain how their past experience aligns with the requirement, even if it is not directly stated.

If the answer is not present in the context, reply gracefully with:
\"{fallback}\"

Context:
{context}

Question:
{question}

Answer:
";

const REQUIRED: [&str; 2] = ["context", "question"];

/// Values substituted into a [`PromptTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct PromptVars<'a> {
    /// Retrieved chunks, already joined.
    pub context: &'a str,
    /// The user's question.
    pub question: &'a str,
    /// Who the persona speaks for.
    pub subject: &'a str,
    /// The polite non-answer.
    pub fallback: &'a str,
}

impl PromptVars<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "context" => Some(self.context),
            "question" => Some(self.question),
            "subject" => Some(self.subject),
            "fallback" => Some(self.fallback),
            _ => None,
        }
    }
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { text: PERSONA_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template from text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `{context}` or `{question}` is missing.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for name in REQUIRED {
            if !text.contains(&format!("{{{name}}}")) {
                return Err(RagError::ConfigError(format!(
                    "prompt template is missing the {{{name}}} placeholder"
                )));
            }
        }
        Ok(Self { text })
    }

    /// Load a template from a file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the file cannot be read, or
    /// [`RagError::ConfigError`] if it lacks a required placeholder.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
        Self::new(text)
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitute every known placeholder. Unknown `{...}` sequences are kept verbatim.
    pub fn render(&self, vars: &PromptVars<'_>) -> String {
        let mut out = String::with_capacity(self.text.len() + vars.context.len() + vars.question.len());
        let mut rest = self.text.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after
                .find('}')
                .and_then(|close| vars.get(&after[..close]).map(|value| (value, close)));
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(context: &'a str, question: &'a str) -> PromptVars<'a> {
        PromptVars { context, question, subject: "Ada", fallback: FALLBACK_ANSWER }
    }

    #[test]
    fn builtin_template_renders_every_slot() {
        let prompt = PromptTemplate::default().render(&vars("Built ledgers.", "What did Ada build?"));
        assert!(prompt.contains("named Ada."));
        assert!(prompt.contains("Context:\nBuilt ledgers.\n"));
        assert!(prompt.contains("Question:\nWhat did Ada build?\n"));
        assert!(prompt.contains(FALLBACK_ANSWER));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let template = PromptTemplate::new("Q: {question}\nC: {context}").unwrap();
        let prompt = template.render(&vars("ctx", "what is {context}?"));
        assert_eq!(prompt, "Q: what is {context}?\nC: ctx");
    }

    #[test]
    fn unknown_braces_are_preserved() {
        let template = PromptTemplate::new("{context} {question} {\"json\": 1} {").unwrap();
        assert_eq!(template.render(&vars("a", "b")), "a b {\"json\": 1} {");
    }

    #[test]
    fn template_without_question_is_rejected() {
        assert!(matches!(PromptTemplate::new("Context: {context}"), Err(RagError::ConfigError(_))));
    }
}
