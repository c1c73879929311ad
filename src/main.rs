// ABOUTME: Entry point for the strata CLI application.
// ABOUTME: Parses arguments, sets up logging and Ctrl-C handling, and dispatches commands.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;
use strata::error::{EXIT_SUCCESS, Result};
use strata::executor::Cancellation;
use strata::output::Output;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise debug with --verbose, info for strata alone without.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn,strata=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output);
    let error_output = Output::new(cli.output);

    match run(cli.command, output).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            error_output.error(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    match command {
        Commands::Deploy(args) => commands::deploy(args, ctrl_c_cancellation(), output).await,
        Commands::Plan(args) => commands::plan(args, output),
        Commands::Validate(args) => commands::validate(args, output).await,
    }
}

/// Cancellation that fires on the first Ctrl-C.
fn ctrl_c_cancellation() -> Cancellation {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current provider call");
            let _ = tx.send(true);
        }
    });
    Cancellation::new(rx)
}
