//! The `report` command: render a report from stored trace files.

use anyhow::{Context, Result};

use crate::args::ReportArgs;
use crate::reporting;

/// Execute the report command. Returns true when every loaded eval passed.
pub fn run(args: ReportArgs) -> Result<bool> {
    let mut results = Vec::with_capacity(args.trace_files.len());
    for path in &args.trace_files {
        let result = reporting::load_trace_file(path)
            .with_context(|| format!("failed to load trace file {}", path.display()))?;
        results.push(result);
    }

    let mut stdout = std::io::stdout().lock();
    reporting::print_report(&mut stdout, &results, args.verbose)?;

    Ok(results.iter().all(|result| !result.is_failure()))
}
