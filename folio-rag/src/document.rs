//! Data types for documents, chunks, retrieval results and answers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classifier::Category;

/// A source document as read from the corpus directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// File name of the document.
    pub id: String,
    /// Extracted page texts, in page order. Pages without text are omitted.
    pub pages: Vec<String>,
}

impl Document {
    /// The document text with a newline after every page.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.pages.iter().map(|p| p.len() + 1).sum());
        for page in &self.pages {
            text.push_str(page);
            text.push('\n');
        }
        text
    }
}

/// A contiguous slice of the concatenated corpus text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in corpus traversal order.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// A retrieved chunk together with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Insertion position of the entry in the index.
    pub position: usize,
    /// The chunk text.
    pub text: String,
    /// Distance to the query under the index metric (lower is closer).
    pub distance: f32,
}

/// Up to `k` hits ordered by ascending distance, ties by insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The ranked hits.
    pub hits: Vec<SearchHit>,
}

impl RetrievalResult {
    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns `true` if nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The hit texts, best first.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.text.as_str())
    }
}

/// A generated answer with its category and display marker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Answer {
    /// Raw model output.
    pub text: String,
    /// Category assigned by the response classifier.
    pub category: Category,
    /// Decorative marker derived from `category`.
    pub marker: &'static str,
}

impl Answer {
    /// Create an answer, deriving the marker from the category.
    pub fn new(text: impl Into<String>, category: Category) -> Self {
        Self { text: text.into(), category, marker: category.marker() }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.marker, self.text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_text_terminates_every_page() {
        let doc = Document { id: "cv.pdf".into(), pages: vec!["one".into(), "two".into()] };
        assert_eq!(doc.text(), "one\ntwo\n");
    }

    #[test]
    fn answer_display_prefixes_the_marker() {
        let answer = Answer::new("  Five years in fintech. \n", Category::Experience);
        assert_eq!(answer.to_string(), format!("{} Five years in fintech.", Category::Experience.marker()));
    }
}
