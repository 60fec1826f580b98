//! Text units flowing through the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// Page-level text read from a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Source document path.
    pub source: String,
    /// Zero-based page number within the source.
    pub page: usize,
    /// Extracted page text.
    pub text: String,
}

impl Page {
    /// Builds a page.
    pub fn new(source: impl Into<String>, page: usize, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            text: text.into(),
        }
    }
}

/// Bounded piece of source text submitted to the embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Source document path.
    pub source: String,
    /// Page the chunk was cut from.
    pub page: usize,
    /// Position in the overall chunk sequence.
    pub position: usize,
    /// Chunk body text.
    pub text: String,
}
