//! The `run` command: load a suite, run it, write traces, print the report.

use anyhow::{bail, Context, Result};
use regex::Regex;

use mcpgrade_core::{Eval, EvalClient, EvalConfig};

use crate::args::RunArgs;
use crate::color;
use crate::reporting;

/// Execute the run command. Returns true when every eval passed.
pub async fn run(args: RunArgs) -> Result<bool> {
    let mut config = EvalConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    // MCP server overrides from the command line
    if let Some(command) = &args.mcp_command {
        config.mcp_server.command = command.clone();
    }
    if !args.mcp_args.is_empty() {
        config.mcp_server.args = args.mcp_args.clone();
    }
    if !args.mcp_env.is_empty() {
        config.mcp_server.env = args.mcp_env.clone();
    }

    let evals_to_run = match &args.filter {
        Some(pattern) => {
            let filtered = filter_evals(&config.evals, pattern)?;
            if filtered.is_empty() {
                bail!("no evals matched filter pattern: {pattern}");
            }
            if !args.quiet {
                println!(
                    "Filter '{}' matched {} of {} eval(s)",
                    pattern,
                    filtered.len(),
                    config.evals.len()
                );
            }
            filtered
        }
        None => config.evals.clone(),
    };

    let deadline = match &config.timeout {
        Some(timeout) => {
            let duration = humantime::parse_duration(timeout)
                .with_context(|| format!("invalid timeout '{timeout}'"))?;
            Some(tokio::time::Instant::now() + duration)
        }
        None => None,
    };

    let api_key = args
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .context("no API key provided (set ANTHROPIC_API_KEY or pass --api-key)")?;

    let client_config = config.to_client_config(api_key, args.base_url.clone())?;
    let client = EvalClient::new(client_config);

    if !args.quiet {
        println!("Running {} evaluation(s)...\n", evals_to_run.len());
    }

    let mut results = Vec::with_capacity(evals_to_run.len());
    for (i, eval) in evals_to_run.iter().enumerate() {
        if !args.quiet {
            println!(
                "{}",
                color::bold(&format!(
                    "[{}/{}] Running eval: {}",
                    i + 1,
                    evals_to_run.len(),
                    eval.name
                ))
            );
            if !eval.description.is_empty() {
                println!("        {}", color::gray(&eval.description));
            }
        }

        let Some(result) = client
            .run_evals_until(std::slice::from_ref(eval), deadline)
            .await
            .pop()
        else {
            continue;
        };

        if !args.quiet {
            match (&result.error, &result.grade) {
                (Some(error), _) => {
                    println!("        {}", color::red(&format!("{} {error}", color::x_mark())));
                }
                (None, Some(grade)) => {
                    println!(
                        "        {}",
                        color::green(&format!(
                            "{} Completed (avg score: {:.1}/5)",
                            color::check_mark(),
                            grade.average()
                        ))
                    );
                }
                (None, None) => {
                    println!(
                        "        {}",
                        color::green(&format!("{} Completed", color::check_mark()))
                    );
                }
            }
            println!();
        }

        results.push(result);
    }

    if let Some(trace_dir) = &args.trace_dir {
        reporting::write_traces(&results, trace_dir)
            .context("failed to write traces")?;
    }

    let mut stdout = std::io::stdout().lock();
    reporting::print_report(&mut stdout, &results, args.verbose)?;

    Ok(results.iter().all(|result| !result.is_failure()))
}

/// Filter evaluations by regex pattern matched against eval names.
fn filter_evals(evals: &[Eval], pattern: &str) -> Result<Vec<Eval>> {
    let regex = Regex::new(pattern).context("invalid filter pattern")?;
    Ok(evals
        .iter()
        .filter(|eval| regex.is_match(&eval.name))
        .cloned()
        .collect())
}
