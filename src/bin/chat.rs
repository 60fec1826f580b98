use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use roteiro::{init_tracing, report_failure, Conversation, GeminiChat, ModelArgs, SessionStore};

const DEFAULT_QUESTIONS: [&str; 2] = [
    "Quero visitar um lugar no Brasil, famosos por praias e cultura. Pode sugerir?",
    "Qual a melhor época do ano para ir?",
];

#[derive(Parser, Debug)]
#[command(
    name = "roteiro-chat",
    about = "Ask the travel guide a sequence of questions within one remembered session"
)]
struct ChatCli {
    #[command(flatten)]
    model: ModelArgs,

    /// Session identifier used to key the conversation history
    #[arg(long, env = "ROTEIRO_SESSION", default_value = "aula_langchain_alura")]
    session: String,

    /// Question to ask; repeat for a multi-turn conversation
    #[arg(long = "question")]
    questions: Vec<String>,
}

fn main() -> ExitCode {
    let cli = ChatCli::parse();
    init_tracing(cli.model.debug);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", report_failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &ChatCli) -> Result<()> {
    let settings = cli.model.settings();
    let model = GeminiChat::new(&settings)?;
    let mut store = SessionStore::new();
    let mut conversation = Conversation::travel_guide(&model, &mut store, settings.temperature())?;

    let questions: Vec<&str> = if cli.questions.is_empty() {
        DEFAULT_QUESTIONS.to_vec()
    } else {
        cli.questions.iter().map(String::as_str).collect()
    };
    for question in questions {
        let reply = conversation.ask(&cli.session, question)?;
        println!("Usuário: {question}");
        println!("IA: {reply}\n");
    }
    Ok(())
}
