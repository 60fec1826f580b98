use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use roteiro::config::DEFAULT_EMBEDDING_MODEL;
use roteiro::rag::{open_or_build, GeminiEmbedder, InsuranceAdvisor, RagSettings, ThreadSleep};
use roteiro::{init_tracing, report_failure, GeminiChat, ModelArgs, ModelSettings};

#[derive(Parser, Debug)]
#[command(
    name = "roteiro-rag",
    about = "Answer card insurance questions from a local index built over the benefit PDFs"
)]
struct RagCli {
    #[command(flatten)]
    model: ModelArgs,

    /// Question to answer from the documents
    #[arg(
        long,
        default_value = "Como devo proceder caso tenha um item comprado roubado e caso eu tenha o cartão gold?"
    )]
    question: String,

    /// Directory holding the persisted index
    #[arg(long, env = "ROTEIRO_INDEX_DIR", default_value = "banco_faiss_seguros")]
    index_dir: PathBuf,

    /// PDF files to index when no index exists yet
    #[arg(
        long = "document",
        default_values = [
            "documentos/GTB_standard_Nov23.pdf",
            "documentos/GTB_gold_Nov23.pdf",
            "documentos/GTB_platinum_Nov23.pdf",
        ]
    )]
    documents: Vec<PathBuf>,

    /// Embedding model identifier
    #[arg(long, env = "ROTEIRO_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Optional output dimensionality for embeddings
    #[arg(long, env = "ROTEIRO_EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Attempts per embedding call; 1 disables retries
    #[arg(long, env = "ROTEIRO_EMBEDDING_ATTEMPTS", default_value_t = 1)]
    embedding_attempts: usize,

    /// Chunks per embedding call
    #[arg(long, env = "ROTEIRO_BATCH_SIZE", default_value_t = 40)]
    batch_size: usize,

    /// Seconds to wait between embedding calls
    #[arg(long, env = "ROTEIRO_PACING_SECS", default_value_t = 20)]
    pacing_secs: u64,

    /// Maximum chunk length in characters
    #[arg(long, env = "ROTEIRO_CHUNK_SIZE", default_value_t = 1500)]
    chunk_size: usize,

    /// Characters shared by adjacent chunks
    #[arg(long, env = "ROTEIRO_CHUNK_OVERLAP", default_value_t = 150)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "ROTEIRO_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Only print the retrieved chunks (skip the answer call)
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = RagCli::parse();
    init_tracing(cli.model.debug);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", report_failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &RagCli) -> Result<()> {
    let chat_settings = cli.model.settings().with_temperature(0.0);
    let embedding_settings = ModelSettings::new(
        cli.model.api_key.clone(),
        cli.model.base_url.clone(),
        cli.embedding_model.clone(),
        0.0,
        cli.model.request_timeout(),
    );
    let embedder = GeminiEmbedder::new(
        &embedding_settings,
        cli.embedding_dimensions,
        cli.embedding_attempts,
        cli.batch_size,
    )?;

    let settings = RagSettings {
        index_dir: cli.index_dir.clone(),
        documents: cli.documents.clone(),
        batch_size: cli.batch_size,
        pacing: Duration::from_secs(cli.pacing_secs),
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        top_k: cli.top_k,
    };
    let index = open_or_build(&settings, &embedder, ThreadSleep)?;

    let model = GeminiChat::new(&chat_settings)?;
    let advisor = InsuranceAdvisor::new(&index, &embedder, &model, settings.top_k)?;
    println!("{}", "-".repeat(30));
    println!("\nBuscando resposta para: {}", cli.question);

    if cli.dry_run {
        for hit in advisor.retrieve(&cli.question)? {
            println!(
                "[{} p.{} | {:.4}]\n{}\n---",
                hit.chunk.source,
                hit.chunk.page + 1,
                hit.score,
                hit.chunk.text
            );
        }
        return Ok(());
    }

    let answer = advisor.answer(&cli.question)?;
    println!("\nRESPOSTA:\n{answer}");
    Ok(())
}
