//! mcpgrade - evaluate MCP servers with LLM-graded agent runs.

mod args;
mod color;
mod commands;
mod reporting;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Report(args) => commands::report::run(args),
        Command::Validate(args) => commands::validate::run(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("{}: {error:#}", color::red("error"));
            ExitCode::FAILURE
        }
    }
}
