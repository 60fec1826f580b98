//! Rate-limited batch ingestion into a [`VectorIndex`].
//!
//! Chunks are embedded in fixed-size batches, strictly one after another,
//! with a pause between consecutive batches to stay under the provider's
//! request quota. The first batch creates the index and every later batch is
//! appended to it. Any failure aborts the whole run; the caller only persists
//! an index that covers every chunk.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use super::document::Chunk;
use super::embedder::Embedder;
use super::index::{IndexError, VectorIndex};
use crate::error::ModelError;

/// Splits `chunks` into consecutive batches of at most `batch_size`. A zero size is treated as one.
pub fn partition(chunks: &[Chunk], batch_size: usize) -> impl Iterator<Item = &[Chunk]> {
    chunks.chunks(batch_size.max(1))
}

/// Waits between batches.
pub trait Pacer {
    /// Blocks for `delay`.
    fn pause(&self, delay: Duration);
}

/// Pacer that sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn pause(&self, delay: Duration) {
        (**self).pause(delay)
    }
}

/// Reason an ingestion run stopped.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The embedding call for a batch failed.
    #[error("batch {batch} of {total} failed after {embedded} chunks were embedded: {source}")]
    Embedding {
        /// One-based number of the failing batch.
        batch: usize,
        /// Total number of batches in the run.
        total: usize,
        /// Chunks embedded before the failure.
        embedded: usize,
        /// Model error.
        #[source]
        source: ModelError,
    },
    /// The embeddings of a batch could not be stored.
    #[error("batch {batch} of {total} could not be indexed after {embedded} chunks were embedded: {source}")]
    Index {
        /// One-based number of the failing batch.
        batch: usize,
        /// Total number of batches in the run.
        total: usize,
        /// Chunks embedded before the failure.
        embedded: usize,
        /// Index error.
        #[source]
        source: IndexError,
    },
}

impl IngestError {
    /// Chunks embedded before the run stopped. That work is discarded.
    pub fn embedded(&self) -> usize {
        match self {
            Self::Embedding { embedded, .. } | Self::Index { embedded, .. } => *embedded,
        }
    }

    /// Model error behind the failure, if any.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Embedding { source, .. } => Some(source),
            Self::Index { .. } => None,
        }
    }
}

/// Sequential uploader that paces embedding calls.
pub struct BatchUploader<P = ThreadSleep> {
    batch_size: usize,
    pacing: Duration,
    pacer: P,
}

impl BatchUploader<ThreadSleep> {
    /// Uploader that sleeps the current thread between batches.
    pub fn new(batch_size: usize, pacing: Duration) -> Self {
        Self::with_pacer(batch_size, pacing, ThreadSleep)
    }
}

impl<P: Pacer> BatchUploader<P> {
    /// Uploader with a custom pacer.
    pub fn with_pacer(batch_size: usize, pacing: Duration, pacer: P) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pacing,
            pacer,
        }
    }

    /// Chunks per embedding call.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Delay between consecutive batches.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Embeds every chunk and returns the resulting index, or `None` when there is nothing to embed.
    pub fn ingest<E: Embedder + ?Sized>(
        &self,
        chunks: &[Chunk],
        embedder: &E,
    ) -> Result<Option<VectorIndex>, IngestError> {
        if chunks.is_empty() {
            info!("no chunks to embed");
            return Ok(None);
        }
        let total = chunks.len().div_ceil(self.batch_size);
        info!(
            chunks = chunks.len(),
            batches = total,
            batch_size = self.batch_size,
            "starting ingestion"
        );

        let mut index: Option<VectorIndex> = None;
        let mut embedded = 0usize;
        for (idx, batch) in partition(chunks, self.batch_size).enumerate() {
            let number = idx + 1;
            if idx > 0 {
                debug!(delay_ms = self.pacing.as_millis() as u64, "pausing before next batch");
                self.pacer.pause(self.pacing);
            }

            let started = Instant::now();
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .map_err(|source| IngestError::Embedding {
                    batch: number,
                    total,
                    embedded,
                    source,
                })?;

            let stored = match index.take() {
                Some(mut existing) => existing.add(batch, vectors).map(|()| existing),
                None => VectorIndex::from_batch(batch, vectors),
            };
            index = Some(stored.map_err(|source| IngestError::Index {
                batch: number,
                total,
                embedded,
                source,
            })?);

            embedded += batch.len();
            info!(
                batch = number,
                total,
                size = batch.len(),
                embedded,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch embedded"
            );
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    fn chunks(count: usize) -> Vec<Chunk> {
        (0..count)
            .map(|position| Chunk {
                source: "platinum.pdf".into(),
                page: position / 10,
                position,
                text: format!("trecho {position}"),
            })
            .collect()
    }

    #[derive(Default)]
    struct RecordingEmbedder {
        calls: RefCell<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    impl Embedder for RecordingEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            let mut calls = self.calls.borrow_mut();
            calls.push(inputs.len());
            if self.fail_on_call == Some(calls.len()) {
                return Err(ModelError::Overloaded {
                    message: "quota".into(),
                });
            }
            Ok(inputs.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[derive(Default)]
    struct CountingPacer {
        pauses: Cell<usize>,
    }

    impl Pacer for CountingPacer {
        fn pause(&self, delay: Duration) {
            assert_eq!(delay, Duration::from_secs(20));
            self.pauses.set(self.pauses.get() + 1);
        }
    }

    #[test]
    fn batches_are_paced_between_calls_only() {
        let pacer = CountingPacer::default();
        let uploader = BatchUploader::with_pacer(40, Duration::from_secs(20), &pacer);
        let embedder = RecordingEmbedder::default();

        let index = uploader.ingest(&chunks(85), &embedder).unwrap().unwrap();

        assert_eq!(*embedder.calls.borrow(), vec![40, 40, 5]);
        assert_eq!(pacer.pauses.get(), 2);
        assert_eq!(index.len(), 85);
        let positions: Vec<usize> = index.entries().iter().map(|e| e.chunk.position).collect();
        assert_eq!(positions, (0..85).collect::<Vec<_>>());
    }

    #[test]
    fn single_batch_never_pauses() {
        let pacer = CountingPacer::default();
        let uploader = BatchUploader::with_pacer(40, Duration::from_secs(20), &pacer);
        let embedder = RecordingEmbedder::default();

        let index = uploader.ingest(&chunks(40), &embedder).unwrap().unwrap();
        assert_eq!(index.len(), 40);
        assert_eq!(pacer.pauses.get(), 0);
    }

    #[test]
    fn empty_input_skips_the_embedder() {
        let pacer = CountingPacer::default();
        let uploader = BatchUploader::with_pacer(40, Duration::from_secs(20), &pacer);
        let embedder = RecordingEmbedder::default();

        assert!(uploader.ingest(&[], &embedder).unwrap().is_none());
        assert!(embedder.calls.borrow().is_empty());
        assert_eq!(pacer.pauses.get(), 0);
    }

    #[test]
    fn failure_aborts_and_reports_progress() {
        let pacer = CountingPacer::default();
        let uploader = BatchUploader::with_pacer(40, Duration::from_secs(20), &pacer);
        let embedder = RecordingEmbedder {
            fail_on_call: Some(2),
            ..Default::default()
        };

        let err = uploader.ingest(&chunks(85), &embedder).unwrap_err();
        assert_eq!(err.embedded(), 40);
        assert!(err.model_error().is_some_and(ModelError::is_overloaded));
        assert!(matches!(err, IngestError::Embedding { batch: 2, total: 3, .. }));
        assert_eq!(*embedder.calls.borrow(), vec![40, 40]);
        assert_eq!(pacer.pauses.get(), 1);
    }

    proptest! {
        #[test]
        fn partition_covers_input_in_order(count in 0usize..300, size in 1usize..64) {
            let input = chunks(count);
            let batches: Vec<&[Chunk]> = partition(&input, size).collect();

            prop_assert_eq!(batches.len(), count.div_ceil(size));
            prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
            let flattened: Vec<usize> = batches
                .iter()
                .flat_map(|b| b.iter().map(|c| c.position))
                .collect();
            prop_assert_eq!(flattened, (0..count).collect::<Vec<_>>());
        }
    }
}
