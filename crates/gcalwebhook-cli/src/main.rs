//! gcalendar-webhook-cli entry point.

use std::process::ExitCode;

use clap::Parser;

use gcalwebhook_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Values from .env feed clap's env fallbacks, so load it first.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match gcalwebhook_cli::init_logging(&cli) {
        Ok(()) => gcalwebhook_cli::run(cli).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
