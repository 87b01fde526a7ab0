//! The `validate` command: check a suite file without running it.

use anyhow::Result;

use mcpgrade_core::EvalConfig;

use crate::args::ValidateArgs;
use crate::color;

/// Execute the validate command. Returns true when the config is valid.
pub fn run(args: ValidateArgs) -> Result<bool> {
    match EvalConfig::load(&args.config) {
        Ok(config) => {
            println!(
                "{} {} is valid ({} eval(s), model {})",
                color::green(color::check_mark()),
                args.config.display(),
                config.evals.len(),
                config.model
            );
            Ok(true)
        }
        Err(error) => {
            println!(
                "{} {} is invalid: {}",
                color::red(color::x_mark()),
                args.config.display(),
                error
            );
            Ok(false)
        }
    }
}
