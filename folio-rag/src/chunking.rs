//! Overlapping fixed-size chunking.
//!
//! [`Chunker`] cuts text into windows of at most `max_size` characters. Each
//! window after the first starts exactly `overlap` characters before the end
//! of its predecessor, so dropping the first `overlap` characters of every
//! chunk but the first and concatenating reproduces the input.
//!
//! Within a window the cut is placed at the last natural boundary, trying in
//! order: paragraph break, line break, sentence end, space. Only when none of
//! them falls in the back half of the window is the text cut mid-word.
//!
//! Sizes are counted in `char`s, never bytes.

use std::iter;

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Boundaries tried in order of preference. The cut is placed after the separator.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// Splits text into overlapping chunks, preferring natural boundaries.
///
/// # Example
///
/// ```rust
/// use folio_rag::Chunker;
///
/// let chunker = Chunker::new(500, 100).unwrap();
/// let chunks = chunker.split("Short text.");
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new `Chunker`.
    ///
    /// # Arguments
    ///
    /// * `max_size`: maximum number of characters per chunk
    /// * `overlap`: number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if `max_size` is zero or
    /// `overlap >= max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(RagError::ChunkingError("max_size must be greater than zero".to_string()));
        }
        if overlap >= max_size {
            return Err(RagError::ChunkingError(format!(
                "overlap ({overlap}) must be less than max_size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Maximum chunk length in characters.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Characters shared by consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks in reading order.
    ///
    /// Empty input yields no chunks; input of at most `max_size` characters
    /// yields exactly one.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(iter::once(text.len())).collect();
        let char_count = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            if char_count - start <= self.max_size {
                chunks.push(Chunk { index: chunks.len(), text: text[bounds[start]..].to_string() });
                break;
            }

            let end = self.find_cut(text, &bounds, start);
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[bounds[start]..bounds[end]].to_string(),
            });
            // `find_cut` guarantees end > start + overlap, so this always advances.
            start = end - self.overlap;
        }

        chunks
    }

    /// Pick the char index at which the window starting at `start` ends.
    ///
    /// The result lies in `floor..=start + max_size`, where `floor` keeps
    /// chunks from shrinking below half the window and always leaves room
    /// for the overlap.
    fn find_cut(&self, text: &str, bounds: &[usize], start: usize) -> usize {
        let limit = start + self.max_size;
        let floor = (start + self.overlap + 1).max(start + self.max_size / 2);
        let window = &text[bounds[start]..bounds[limit]];

        for separator in SEPARATORS {
            let Some(pos) = window.rfind(separator) else {
                continue;
            };
            let cut_byte = bounds[start] + pos + separator.len();
            // Separators are ASCII, so the cut always lands on a char boundary.
            if let Ok(cut) = bounds.binary_search(&cut_byte) {
                if cut >= floor {
                    return cut;
                }
            }
        }

        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = Chunker::new(50, 10).unwrap().split("Backend developer with fintech focus.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(Chunker::new(50, 10).unwrap().split("").is_empty());
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "Skills: Rust, Go.\n\nExperience: five years building payment systems.";
        let chunks = Chunker::new(30, 5).unwrap().split(text);
        assert_eq!(chunks[0].text, "Skills: Rust, Go.\n\n");
        assert!(chunks.last().unwrap().text.ends_with("payment systems."));
    }

    #[test]
    fn falls_back_to_word_breaks() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = Chunker::new(16, 4).unwrap().split(text);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(' '), "cut inside a word: {:?}", chunk.text);
        }
    }

    #[test]
    fn hard_cut_when_no_boundary_exists() {
        let text = "x".repeat(25);
        let chunks = Chunker::new(10, 3).unwrap().split(&text);
        let lengths: Vec<usize> = texts(&chunks).iter().map(|t| t.len()).collect();
        assert_eq!(lengths, vec![10, 10, 10, 4]);
    }

    #[test]
    fn consecutive_chunks_share_exactly_the_overlap() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(8);
        let overlap = 12;
        let chunks = Chunker::new(60, overlap).unwrap().split(&text);
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].text.chars().collect();
                chars[chars.len() - overlap..].iter().collect()
            };
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(30);
        let chunks = Chunker::new(10, 2).unwrap().split(&text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(Chunker::new(10, 10), Err(RagError::ChunkingError(_))));
        assert!(matches!(Chunker::new(0, 0), Err(RagError::ChunkingError(_))));
    }
}
