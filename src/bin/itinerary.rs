use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use roteiro::chain::plan_itinerary;
use roteiro::{init_tracing, report_failure, GeminiChat, ItineraryRequest, ModelArgs};

#[derive(Parser, Debug)]
#[command(
    name = "roteiro-itinerary",
    about = "Render the family itinerary prompt and print the model's plan"
)]
struct ItineraryCli {
    #[command(flatten)]
    model: ModelArgs,

    /// Trip length in days
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// Number of children travelling
    #[arg(long, default_value_t = 2)]
    children: u32,

    /// Activity the family enjoys
    #[arg(long, default_value = "praia")]
    activity: String,
}

fn main() -> ExitCode {
    let cli = ItineraryCli::parse();
    init_tracing(cli.model.debug);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", report_failure(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &ItineraryCli) -> Result<()> {
    let settings = cli.model.settings();
    let model = GeminiChat::new(&settings)?;
    let request = ItineraryRequest {
        days: cli.days,
        children: cli.children,
        activity: cli.activity.clone(),
    };
    let (prompt, reply) = plan_itinerary(&model, settings.temperature(), &request)?;
    println!("Prompt : \n{prompt}");
    println!("{reply}");
    Ok(())
}
