//! Retrieval-augmented answering over PDF documents.
//!
//! ```text
//! PDFs ──► loader ──► Page ──► splitter ──► Chunk ──► batcher ──► VectorIndex ──► disk
//!                                                        │
//!                                                        └─► embedder (one call per batch)
//!
//! question ──► embedder ──► VectorIndex::search ──► context ──► chat model ──► answer
//! ```

pub mod batcher;
pub mod document;
pub mod embedder;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod splitter;

pub use batcher::{partition, BatchUploader, IngestError, Pacer, ThreadSleep};
pub use document::{Chunk, Page};
pub use embedder::{Embedder, GeminiEmbedder};
pub use index::{IndexError, SearchHit, VectorIndex};
pub use loader::{load_all, LoadReport, PdfLoader};
pub use pipeline::{build_from_pages, open_or_build, AdvisorError, InsuranceAdvisor, RagSettings};
pub use splitter::RecursiveSplitter;
