use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use roteiro::router::ask_consultant;
use roteiro::{
    init_tracing, report_failure, Classifier, GeminiChat, KeywordClassifier, LlmClassifier,
    ModelArgs, RouterGraph,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ClassifierKind {
    /// Schema-constrained model call
    Llm,
    /// Local keyword matching, no model call
    Keyword,
}

#[derive(Parser, Debug)]
#[command(
    name = "roteiro-router",
    about = "Route a travel question to the beach or mountain expert"
)]
struct RouterCli {
    #[command(flatten)]
    model: ModelArgs,

    /// Travel question to answer
    #[arg(long, default_value = "Quero férias em praias no Brasil.")]
    query: String,

    /// How the query is classified
    #[arg(long, value_enum, default_value_t = ClassifierKind::Llm)]
    classifier: ClassifierKind,

    /// Skip routing and ask the general Brazil travel consultant
    #[arg(long, default_value_t = false)]
    consultant: bool,
}

fn main() -> ExitCode {
    let cli = RouterCli::parse();
    init_tracing(cli.model.debug);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", report_failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &RouterCli) -> Result<()> {
    let settings = cli.model.settings();
    let model = GeminiChat::new(&settings)?;
    if cli.consultant {
        println!("{}", ask_consultant(&model, settings.temperature(), &cli.query)?);
        return Ok(());
    }
    match cli.classifier {
        ClassifierKind::Llm => route(LlmClassifier::new(&model), &model, cli, settings.temperature()),
        ClassifierKind::Keyword => route(KeywordClassifier, &model, cli, settings.temperature()),
    }
}

fn route<C: Classifier>(
    classifier: C,
    model: &GeminiChat,
    cli: &RouterCli,
    temperature: f32,
) -> Result<()> {
    let graph = RouterGraph::with_default_experts(classifier, model, temperature)?;
    let outcome = graph.invoke(&cli.query)?;
    println!("Destino: {}", outcome.category.label());
    println!("{}", outcome.answer);
    Ok(())
}
