//! In-memory vector index persisted as a JSON file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::Chunk;

const INDEX_FILE: &str = "index.json";
const PARTIAL_FILE: &str = "index.json.partial";

/// Errors raised while building, searching or persisting an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Chunk and vector counts differ.
    #[error("got {vectors} vectors for {chunks} chunks")]
    CountMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector does not have the index dimensionality.
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch {
        /// Index dimensionality.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },
    /// An index needs at least one entry to fix its dimensionality.
    #[error("cannot create an index from an empty batch")]
    Empty,
    /// Reading or writing the index directory failed.
    #[error("index I/O failed for {path:?}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The index file could not be encoded or decoded.
    #[error("index file {path:?} is malformed: {source}")]
    Format {
        /// Index file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// A chunk stored alongside its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Source chunk.
    pub chunk: Chunk,
    /// Document embedding of the chunk text.
    pub embedding: Vec<f32>,
}

/// Search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Matching chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

/// Flat (exhaustive) cosine-similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Creates an index from the first embedded batch. The first vector fixes the dimensionality.
    pub fn from_batch(chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimensions = vectors.first().map(Vec::len).ok_or(IndexError::Empty)?;
        let mut index = Self {
            dimensions,
            entries: Vec::with_capacity(chunks.len()),
        };
        index.add(chunks, vectors)?;
        Ok(index)
    }

    /// Appends a batch. Nothing is added when any vector is rejected.
    pub fn add(&mut self, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }
        self.entries.extend(
            chunks
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding }),
        );
        Ok(())
    }

    /// Vector dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    /// Returns the `k` most similar chunks, best first. Ties keep chunk order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then(a.1.chunk.position.cmp(&b.1.chunk.position))
        });
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    /// True when `dir` holds a completely written index file.
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Writes the index into `dir`, creating it when missing.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// an interrupted save never leaves something [`VectorIndex::exists`] accepts.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(|source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(INDEX_FILE);
        let partial = dir.join(PARTIAL_FILE);
        let encoded = serde_json::to_vec(self).map_err(|source| IndexError::Format {
            path: path.clone(),
            source,
        })?;
        if let Err(source) = fs::write(&partial, encoded) {
            let _ = fs::remove_file(&partial);
            return Err(IndexError::Io {
                path: partial,
                source,
            });
        }
        fs::rename(&partial, &path).map_err(|source| IndexError::Io { path, source })
    }

    /// Reads an index previously written by [`VectorIndex::save`].
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(INDEX_FILE);
        let bytes = fs::read(&path).map_err(|source| IndexError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| IndexError::Format { path, source })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(position: usize, text: &str) -> Chunk {
        Chunk {
            source: "gold.pdf".into(),
            page: 0,
            position,
            text: text.into(),
        }
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let chunks = vec![chunk(0, "bagagem"), chunk(1, "roubo"), chunk(2, "viagem")];
        let index = VectorIndex::from_batch(
            &chunks,
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
        )
        .unwrap();

        let hits = index.search(&[1.0, 0.1], 2).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["roubo", "viagem"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_keep_chunk_order_and_k_is_clamped() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let index =
            VectorIndex::from_batch(&chunks, vec![vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "a");
    }

    #[test]
    fn add_rejects_mismatched_batches() {
        let mut index = VectorIndex::from_batch(&[chunk(0, "a")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(matches!(
            index.add(&[chunk(1, "b")], vec![vec![1.0, 0.0, 0.0]]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            index.add(&[chunk(1, "b"), chunk(2, "c")], vec![vec![1.0, 0.0]]),
            Err(IndexError::CountMismatch { .. })
        ));
        assert_eq!(index.len(), 1);
        assert!(matches!(
            VectorIndex::from_batch(&[], Vec::new()),
            Err(IndexError::Empty)
        ));
    }

    #[test]
    fn save_and_load_preserve_entries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("banco");
        assert!(!VectorIndex::exists(&target));

        let index = VectorIndex::from_batch(
            &[chunk(0, "cobertura"), chunk(1, "carência")],
            vec![vec![0.5, 0.5], vec![0.1, 0.9]],
        )
        .unwrap();
        index.save(&target).unwrap();

        assert!(VectorIndex::exists(&target));
        assert_eq!(VectorIndex::load(&target).unwrap(), index);
    }

    #[test]
    fn leftovers_of_an_interrupted_save_do_not_count_as_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("banco");
        fs::create_dir_all(&target).unwrap();
        assert!(!VectorIndex::exists(&target));

        fs::write(target.join(PARTIAL_FILE), b"{\"dimensions\": 2, \"entr").unwrap();
        assert!(!VectorIndex::exists(&target));

        let index = VectorIndex::from_batch(&[chunk(0, "roubo")], vec![vec![1.0, 0.0]]).unwrap();
        index.save(&target).unwrap();
        assert!(VectorIndex::exists(&target));
        assert!(!target.join(PARTIAL_FILE).exists());
    }

    #[test]
    fn nan_scores_sort_deterministically() {
        let chunks = vec![chunk(0, "corrompido"), chunk(1, "roubo"), chunk(2, "viagem")];
        let index = VectorIndex::from_batch(
            &chunks,
            vec![vec![f32::NAN, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();

        let texts = |hits: Vec<SearchHit>| -> Vec<String> {
            hits.into_iter().map(|h| h.chunk.text).collect()
        };
        let first = texts(index.search(&[1.0, 0.0], 3).unwrap());
        assert_eq!(first.len(), 3);
        let clean: Vec<&str> = first
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "corrompido")
            .collect();
        assert_eq!(clean, vec!["roubo", "viagem"]);
        assert_eq!(texts(index.search(&[1.0, 0.0], 3).unwrap()), first);
    }

    #[test]
    fn loading_a_corrupt_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), b"not json").unwrap();
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::Format { .. })
        ));
    }
}
