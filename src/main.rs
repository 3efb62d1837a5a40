//! fnstage - function invoker staging
//!
//! CLI entry point that dispatches to the stage commands.

use clap::Parser;
use console::style;
use fnstage::cli::{Cli, Commands, PhaseFailure};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("{} {}", style("Error:").red().bold(), failure);
            if let Some(hint) = failure.source.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(failure.phase.exit_code())
        }
    }
}

async fn run() -> Result<(), PhaseFailure> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Supply(args) => fnstage::cli::commands::supply(args, &cli.globals).await,
        Commands::Finalize(args) => fnstage::cli::commands::finalize(args, &cli.globals).await,
        Commands::Cache(args) => fnstage::cli::commands::cache(args, &cli.globals).await,
    }
}
