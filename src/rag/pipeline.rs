//! Index lifecycle and the retrieval-augmented answer chain.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::batcher::{BatchUploader, Pacer};
use super::document::Page;
use super::embedder::Embedder;
use super::index::{IndexError, SearchHit, VectorIndex};
use super::loader::{load_all, PdfLoader};
use super::splitter::RecursiveSplitter;
use crate::error::{ModelError, PromptError};
use crate::llm::{ChatModel, ChatRequest};
use crate::parser::StrOutputParser;
use crate::prompt::{ChatPromptTemplate, Vars};

/// System instruction for the insurance specialist.
pub const ADVISOR_SYSTEM_PROMPT: &str =
    "Você é um especialista em seguros. Responda APENAS com base no contexto fornecido.";

/// Human turn carrying the question and the retrieved context.
pub const ADVISOR_USER_PROMPT: &str = "Pergunta: {query}\n\nContexto:\n{contexto}";

/// Knobs for building and querying the document index.
#[derive(Debug, Clone)]
pub struct RagSettings {
    /// Directory holding the persisted index.
    pub index_dir: PathBuf,
    /// PDF files ingested when no index exists yet.
    pub documents: Vec<PathBuf>,
    /// Chunks per embedding call.
    pub batch_size: usize,
    /// Pause between consecutive embedding calls.
    pub pacing: Duration,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("banco_faiss_seguros"),
            documents: vec![
                PathBuf::from("documentos/GTB_standard_Nov23.pdf"),
                PathBuf::from("documentos/GTB_gold_Nov23.pdf"),
                PathBuf::from("documentos/GTB_platinum_Nov23.pdf"),
            ],
            batch_size: 40,
            pacing: Duration::from_secs(20),
            chunk_size: 1500,
            chunk_overlap: 150,
            top_k: 3,
        }
    }
}

/// Loads the persisted index, or builds and saves it from the configured documents.
///
/// The index is only written after every batch was embedded.
pub fn open_or_build<E, P>(settings: &RagSettings, embedder: &E, pacer: P) -> Result<VectorIndex>
where
    E: Embedder + ?Sized,
    P: Pacer,
{
    if VectorIndex::exists(&settings.index_dir) {
        info!(dir = %settings.index_dir.display(), "loading existing index");
        return VectorIndex::load(&settings.index_dir)
            .with_context(|| format!("failed to load index from {:?}", settings.index_dir));
    }

    info!(dir = %settings.index_dir.display(), "index not found; reading documents");
    let report = load_all(&PdfLoader, &settings.documents);
    if !report.failures.is_empty() {
        warn!(
            failed = report.failures.len(),
            loaded_pages = report.pages.len(),
            "some documents could not be read"
        );
    }

    build_from_pages(settings, &report.pages, embedder, pacer)
}

/// Splits and embeds `pages`, then saves the index to `settings.index_dir`.
///
/// Nothing is written when any batch fails.
pub fn build_from_pages<E, P>(
    settings: &RagSettings,
    pages: &[Page],
    embedder: &E,
    pacer: P,
) -> Result<VectorIndex>
where
    E: Embedder + ?Sized,
    P: Pacer,
{
    let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
    let chunks = splitter.split_pages(pages);
    info!(chunks = chunks.len(), "documents split");

    let uploader = BatchUploader::with_pacer(settings.batch_size, settings.pacing, pacer);
    let index = uploader
        .ingest(&chunks, embedder)?
        .context("no text could be extracted from the configured documents")?;

    index
        .save(&settings.index_dir)
        .with_context(|| format!("failed to save index to {:?}", settings.index_dir))?;
    info!(entries = index.len(), dir = %settings.index_dir.display(), "index saved");
    Ok(index)
}

/// Failures raised while answering a question.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Template rendering failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// Embedding the question or generating the answer failed.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The query vector did not fit the index.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl AdvisorError {
    /// Returns the model error when the failure came from a remote call.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

/// Answers insurance questions from the top-k retrieved chunks.
pub struct InsuranceAdvisor<'a, M: ?Sized, E: ?Sized> {
    index: &'a VectorIndex,
    embedder: &'a E,
    model: &'a M,
    template: ChatPromptTemplate,
    top_k: usize,
}

impl<'a, M, E> InsuranceAdvisor<'a, M, E>
where
    M: ChatModel + ?Sized,
    E: Embedder + ?Sized,
{
    /// Builds the advisor over `index`.
    pub fn new(
        index: &'a VectorIndex,
        embedder: &'a E,
        model: &'a M,
        top_k: usize,
    ) -> Result<Self, PromptError> {
        let template = ChatPromptTemplate::new()
            .system(ADVISOR_SYSTEM_PROMPT)?
            .user(ADVISOR_USER_PROMPT)?;
        Ok(Self {
            index,
            embedder,
            model,
            template,
            top_k,
        })
    }

    /// Chunks most similar to `question`, best first.
    pub fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>, AdvisorError> {
        let query = self.embedder.embed_query(question)?;
        Ok(self.index.search(&query, self.top_k)?)
    }

    /// Answers `question` using only the retrieved context.
    pub fn answer(&self, question: &str) -> Result<String, AdvisorError> {
        let hits = self.retrieve(question)?;
        for hit in &hits {
            debug!(
                source = %hit.chunk.source,
                page = hit.chunk.page,
                score = hit.score,
                "retrieved chunk"
            );
        }
        let context = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let vars = Vars::new().set("query", question).set("contexto", context);
        let messages = self.template.format_messages(&vars, &[])?;
        let reply = self.model.generate(&ChatRequest::new(messages, 0.0))?;
        Ok(StrOutputParser.parse(&reply))
    }
}
