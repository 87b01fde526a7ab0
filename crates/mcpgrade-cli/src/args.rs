//! CLI argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Evaluate MCP servers by driving an LLM agent against their tools and
/// grading the answers.
#[derive(Parser, Debug)]
#[command(name = "mcpgrade")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the evaluations in a suite file
    Run(RunArgs),
    /// Render a report from previously written trace files
    Report(ReportArgs),
    /// Validate a suite file without running anything
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the evaluation suite file (YAML or JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory to write per-eval trace files
    #[arg(long)]
    pub trace_dir: Option<PathBuf>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL for the Anthropic API
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub base_url: Option<String>,

    /// Suppress progress output, only show the summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Show detailed per-eval breakdown
    #[arg(short, long)]
    pub verbose: bool,

    /// Regex pattern to filter which evals run (matched against eval names)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Override the MCP server command from the config
    #[arg(long)]
    pub mcp_command: Option<String>,

    /// Override the MCP server args from the config (repeatable)
    #[arg(long = "mcp-arg", allow_hyphen_values = true)]
    pub mcp_args: Vec<String>,

    /// Override the MCP server env vars from the config (repeatable,
    /// KEY=VALUE)
    #[arg(long = "mcp-env")]
    pub mcp_env: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Trace JSON file(s) to load
    #[arg(required = true)]
    pub trace_files: Vec<PathBuf>,

    /// Show detailed per-eval breakdown
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Path to the evaluation suite file (YAML or JSON)
    #[arg(short, long)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_defaults() {
        let cli = Cli::parse_from(["mcpgrade", "run", "--config", "evals.yaml"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("evals.yaml"));
                assert!(!args.quiet);
                assert!(!args.verbose);
                assert!(args.filter.is_none());
                assert!(args.trace_dir.is_none());
                assert!(args.mcp_args.is_empty());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_run_args_overrides() {
        let cli = Cli::parse_from([
            "mcpgrade",
            "run",
            "-c",
            "evals.yaml",
            "--mcp-command",
            "./server",
            "--mcp-arg",
            "--fast",
            "--mcp-env",
            "A=1",
            "--mcp-env",
            "B=2",
            "-f",
            "addition.*",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.mcp_command.as_deref(), Some("./server"));
                assert_eq!(args.mcp_args, vec!["--fast"]);
                assert_eq!(args.mcp_env, vec!["A=1", "B=2"]);
                assert_eq!(args.filter.as_deref(), Some("addition.*"));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_report_requires_files() {
        assert!(Cli::try_parse_from(["mcpgrade", "report"]).is_err());
        let cli = Cli::parse_from(["mcpgrade", "report", "a.json", "b.json", "-v"]);
        match cli.command {
            Command::Report(args) => {
                assert_eq!(args.trace_files.len(), 2);
                assert!(args.verbose);
            }
            other => panic!("expected report, got {other:?}"),
        }
    }
}
