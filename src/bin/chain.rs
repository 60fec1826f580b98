use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use roteiro::{init_tracing, report_failure, GeminiChat, ModelArgs, TravelChain};

#[derive(Parser, Debug)]
#[command(
    name = "roteiro-chain",
    about = "Suggest a city, local restaurants and cultural activities for an interest"
)]
struct ChainCli {
    #[command(flatten)]
    model: ModelArgs,

    /// Travel interest used to pick the city
    #[arg(long, default_value = "praias")]
    interest: String,

    /// Also print the intermediate city and restaurant suggestions
    #[arg(long, default_value_t = false)]
    show_steps: bool,
}

fn main() -> ExitCode {
    let cli = ChainCli::parse();
    init_tracing(cli.model.debug);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", report_failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &ChainCli) -> Result<()> {
    let settings = cli.model.settings();
    let model = GeminiChat::new(&settings)?;
    let chain = TravelChain::new(&model, settings.temperature())?;
    let outcome = chain.run(&cli.interest)?;
    if cli.show_steps {
        println!(
            "Cidade: {} ({})",
            outcome.destination.cidade, outcome.destination.motivo
        );
        println!("Restaurantes: {}\n", outcome.restaurants.motivo);
    }
    println!("{}", outcome.cultural_tips);
    Ok(())
}
