//! Flat, persisted nearest-neighbour index over chunk embeddings.
//!
//! The index is immutable once built. It is stored as a single JSON file,
//! `index.json`, inside the index directory; saving writes a temporary file
//! and renames it over the old one so a crash never leaves a half-written
//! index that [`VectorIndex::load`] would accept.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, RetrievalResult, SearchHit};
use crate::error::{RagError, Result};

/// Name of the index file inside the index directory.
pub const INDEX_FILE: &str = "index.json";

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// How distances between embeddings are measured. Lower is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`. A zero vector is at distance 1 from everything.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An embedding together with the chunk text it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The chunk embedding.
    pub embedding: Vec<f32>,
    /// The chunk text.
    pub text: String,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format_version: u32,
    dimensions: usize,
    metric: DistanceMetric,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct IndexFile {
    format_version: u32,
    dimensions: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

/// A brute-force vector index. Entries keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build a cosine index from parallel chunk and embedding sequences.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexBuildError`] if the sequences are empty,
    /// differ in length, or the embeddings are not all of the same non-zero
    /// length with finite components.
    pub fn build(chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<Self> {
        Self::build_with_metric(chunks, embeddings, DistanceMetric::default())
    }

    /// Build an index with an explicit distance metric.
    ///
    /// # Errors
    ///
    /// See [`VectorIndex::build`].
    pub fn build_with_metric(
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if chunks.is_empty() || embeddings.is_empty() {
            return Err(RagError::IndexBuildError("cannot build an index from zero chunks".to_string()));
        }
        if chunks.len() != embeddings.len() {
            return Err(RagError::IndexBuildError(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimensions = embeddings[0].len();
        if dimensions == 0 {
            return Err(RagError::IndexBuildError("embeddings must not be empty".to_string()));
        }
        if let Some(position) = embeddings.iter().position(|e| e.len() != dimensions) {
            return Err(RagError::IndexBuildError(format!(
                "embedding {position} has {} dimensions, expected {dimensions}",
                embeddings[position].len()
            )));
        }
        if let Some(position) = embeddings.iter().position(|e| e.iter().any(|x| !x.is_finite())) {
            return Err(RagError::IndexBuildError(format!(
                "embedding {position} contains a non-finite component"
            )));
        }

        let entries = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { embedding, text: chunk.text.clone() })
            .collect();

        Ok(Self { dimensions, metric, entries })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false` for a successfully built or loaded index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding length shared by every entry.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The distance metric used by [`VectorIndex::query`].
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Path of the index file inside `dir`.
    pub fn file_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// Returns `true` if `dir` contains an index file.
    pub fn exists(dir: &Path) -> bool {
        Self::file_path(dir).is_file()
    }

    /// Persist the index into `dir`, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the directory or file cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| RagError::io(dir, e))?;

        let path = Self::file_path(dir);
        let tmp_path = path.with_extension("json.tmp");

        let file = File::create(&tmp_path).map_err(|e| RagError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        let contents = IndexFileRef {
            format_version: FORMAT_VERSION,
            dimensions: self.dimensions,
            metric: self.metric,
            entries: &self.entries,
        };
        serde_json::to_writer(&mut writer, &contents)
            .map_err(|e| RagError::io(&tmp_path, e.into()))?;
        writer.flush().map_err(|e| RagError::io(&tmp_path, e))?;
        writer.get_ref().sync_all().map_err(|e| RagError::io(&tmp_path, e))?;
        drop(writer);

        fs::rename(&tmp_path, &path).map_err(|e| RagError::io(&path, e))?;
        info!(path = %path.display(), entries = self.entries.len(), dimensions = self.dimensions, "saved vector index");
        Ok(())
    }

    /// Load the index stored in `dir`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if there is no index file.
    /// - [`RagError::CorruptIndex`] if the file is truncated, malformed,
    ///   written by another format version, or internally inconsistent.
    /// - [`RagError::IncompatibleIndex`] if its dimensionality differs from
    ///   `expected_dimensions`.
    /// - [`RagError::Io`] for any other read failure.
    pub fn load(dir: &Path, expected_dimensions: usize) -> Result<Self> {
        let path = Self::file_path(dir);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound { path: dir.to_path_buf() });
            }
            Err(e) => return Err(RagError::io(&path, e)),
        };

        let corrupt = |message: String| RagError::CorruptIndex { path: dir.to_path_buf(), message };

        let stored: IndexFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| corrupt(format!("failed to decode {INDEX_FILE}: {e}")))?;

        if stored.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                stored.format_version
            )));
        }
        if stored.entries.is_empty() {
            return Err(corrupt("index has no entries".to_string()));
        }
        if let Some(position) = stored.entries.iter().position(|e| e.embedding.len() != stored.dimensions) {
            return Err(corrupt(format!(
                "entry {position} has {} dimensions, header says {}",
                stored.entries[position].embedding.len(),
                stored.dimensions
            )));
        }
        if stored.dimensions != expected_dimensions {
            return Err(RagError::IncompatibleIndex {
                expected: expected_dimensions,
                found: stored.dimensions,
            });
        }

        debug!(path = %path.display(), entries = stored.entries.len(), "loaded vector index");
        Ok(Self { dimensions: stored.dimensions, metric: stored.metric, entries: stored.entries })
    }

    /// Return up to `k` entries closest to `query`, nearest first.
    ///
    /// `k == 0` or `k` larger than the index returns every entry. Equal
    /// distances are ordered by insertion position.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IncompatibleIndex`] if `query` has the wrong length.
    pub fn query(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if query.len() != self.dimensions {
            return Err(RagError::IncompatibleIndex { expected: self.dimensions, found: query.len() });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, self.metric.distance(&entry.embedding, query)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        if k > 0 {
            scored.truncate(k);
        }

        let hits = scored
            .into_iter()
            .map(|(position, distance)| SearchHit {
                position,
                text: self.entries[position].text.clone(),
                distance,
            })
            .collect();

        Ok(RetrievalResult { hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts.iter().enumerate().map(|(index, t)| Chunk { index, text: t.to_string() }).collect()
    }

    #[test]
    fn build_rejects_mismatched_lengths() {
        let err = VectorIndex::build(&chunks(&["a", "b"]), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, RagError::IndexBuildError(_)));
    }

    #[test]
    fn build_rejects_empty_input() {
        assert!(VectorIndex::build(&[], Vec::new()).is_err());
    }

    #[test]
    fn build_rejects_ragged_embeddings() {
        let err = VectorIndex::build(&chunks(&["a", "b"]), vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, RagError::IndexBuildError(msg) if msg.contains("embedding 1")));
    }

    #[test]
    fn nearest_entry_comes_first() {
        let index = VectorIndex::build(
            &chunks(&["east", "north", "north-east"]),
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();
        let result = index.query(&[0.0, 2.0], 2).unwrap();
        let texts: Vec<&str> = result.texts().collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert!(result.hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn l2_metric_accounts_for_magnitude() {
        let index = VectorIndex::build_with_metric(
            &chunks(&["near", "far"]),
            vec![vec![1.0, 0.0], vec![10.0, 0.0]],
            DistanceMetric::L2,
        )
        .unwrap();
        let result = index.query(&[2.0, 0.0], 1).unwrap();
        assert_eq!(result.hits[0].text, "near");
        assert_eq!(result.hits[0].distance, 1.0);
    }

    #[test]
    fn zero_k_returns_everything() {
        let index = VectorIndex::build(&chunks(&["a", "b", "c"]), vec![vec![1.0]; 3]).unwrap();
        assert_eq!(index.query(&[1.0], 0).unwrap().len(), 3);
    }

    #[test]
    fn wrong_query_length_is_incompatible() {
        let index = VectorIndex::build(&chunks(&["a"]), vec![vec![1.0, 0.0]]).unwrap();
        let err = index.query(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, RagError::IncompatibleIndex { expected: 2, found: 3 }));
    }

    #[test]
    fn save_leaves_no_temporary_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("vector_index");
        let index = VectorIndex::build(&chunks(&["a"]), vec![vec![0.5, 0.5]]).unwrap();
        index.save(&dir).unwrap();

        assert!(VectorIndex::exists(&dir));
        assert!(!dir.join("index.json.tmp").exists());
    }

    #[test]
    fn load_rejects_unknown_format_version() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join(INDEX_FILE),
            r#"{"format_version":99,"dimensions":1,"metric":"cosine","entries":[{"embedding":[1.0],"text":"a"}]}"#,
        )
        .unwrap();
        let err = VectorIndex::load(temp.path(), 1).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex { .. }));
    }
}
