//! Report rendering and trace-file persistence.
//!
//! Trace files contain `{eval, grade?, trace}`. Legacy files holding only a
//! bare trace are still accepted; the eval name is derived from the filename
//! stem.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mcpgrade_core::{Eval, EvalRunResult, EvalTrace, GradeResult};

use crate::color;

/// Persisted per-eval trace file shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct TraceFile {
    pub eval: Eval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeResult>,
    pub trace: EvalTrace,
}

/// Write one trace file per eval that produced a trace.
pub fn write_traces(results: &[EvalRunResult], trace_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(trace_dir)
        .with_context(|| format!("failed to create trace directory {}", trace_dir.display()))?;

    for result in results {
        let Some(trace) = &result.trace else {
            continue;
        };

        let file = TraceFile {
            eval: result.eval.clone(),
            grade: result.grade.clone(),
            trace: trace.clone(),
        };

        let path = trace_dir.join(format!("{}.json", result.eval.name));
        let data = serde_json::to_vec_pretty(&file)
            .with_context(|| format!("failed to marshal trace for {}", result.eval.name))?;
        std::fs::write(&path, data)
            .with_context(|| format!("failed to write trace for {}", result.eval.name))?;
    }

    Ok(())
}

/// Load a trace file, accepting the legacy bare-trace shape.
pub fn load_trace_file(path: &Path) -> Result<EvalRunResult> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trace file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse trace file {}", path.display()))?;

    if value.get("eval").is_some() {
        let file: TraceFile = serde_json::from_value(value)
            .with_context(|| format!("failed to parse trace file {}", path.display()))?;
        return Ok(EvalRunResult {
            eval: file.eval,
            result: None,
            grade: file.grade,
            error: None,
            trace: Some(file.trace),
        });
    }

    // Legacy shape: the file is a bare EvalTrace; derive the name from the
    // filename stem.
    let trace: EvalTrace = serde_json::from_value(value)
        .with_context(|| format!("failed to parse legacy trace file {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(EvalRunResult {
        eval: Eval {
            name,
            description: String::new(),
            prompt: String::new(),
            expected_result: String::new(),
            agent_system_prompt: String::new(),
            grading_rubric: None,
        },
        result: None,
        grade: None,
        error: None,
        trace: Some(trace),
    })
}

fn average(grade: &GradeResult) -> f64 {
    grade.average()
}

fn tool_success_rate(trace: &EvalTrace) -> Option<f64> {
    let calls: Vec<_> = trace.steps.iter().flat_map(|s| &s.tool_calls).collect();
    if calls.is_empty() {
        return None;
    }
    let successes = calls.iter().filter(|c| c.success).count();
    Some(successes as f64 / calls.len() as f64 * 100.0)
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > 25 {
        let prefix: String = name.chars().take(22).collect();
        format!("{prefix}...")
    } else {
        name.to_string()
    }
}

/// Status label plus the colorizer to apply when rendering it.
fn status_of(result: &EvalRunResult) -> (&'static str, fn(&str) -> String) {
    if result.error.is_some() {
        return ("ERROR", color::red);
    }
    if result.trace.is_none() {
        return ("NO TRACE", color::gray);
    }
    match &result.grade {
        Some(grade) if average(grade) >= 3.0 => ("PASS", color::green),
        Some(_) => ("FAIL", color::red),
        None => ("NO GRADE", color::gray),
    }
}

fn build_row(result: &EvalRunResult) -> Vec<String> {
    let name = truncate_name(&result.eval.name);
    let (status, _) = status_of(result);

    let trace = match &result.trace {
        Some(trace) if result.grade.is_some() || result.error.is_none() => trace,
        _ => {
            return vec![
                name,
                status.to_string(),
                "-".into(),
                "-".into(),
                "-".into(),
                "-".into(),
                "-".into(),
            ];
        }
    };
    let avg = result
        .grade
        .as_ref()
        .map(|g| format!("{:.1}", average(g)))
        .unwrap_or_else(|| "-".into());
    let success = tool_success_rate(trace)
        .map(|rate| format!("{rate:.0}%"))
        .unwrap_or_else(|| "-".into());

    vec![
        name,
        status.to_string(),
        avg,
        trace.step_count.to_string(),
        trace.tool_call_count.to_string(),
        success,
        format!(
            "{}→{}",
            trace.total_input_tokens, trace.total_output_tokens
        ),
    ]
}

const HEADERS: [&str; 7] = ["Name", "Status", "Avg", "Steps", "Tools", "Success%", "Tokens (I→O)"];

/// Print the evaluation summary: table, overall stats, and (verbose) a
/// per-eval breakdown.
pub fn print_report<W: Write>(
    w: &mut W,
    results: &[EvalRunResult],
    verbose: bool,
) -> std::io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{}", color::bold(&color::cyan("# Evaluation Summary")))?;
    writeln!(w)?;

    let rows: Vec<Vec<String>> = results.iter().map(build_row).collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let print_row = |w: &mut W, cells: &[String], colorize_status: bool| -> std::io::Result<()> {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            let padding = " ".repeat(widths[i] - cell.chars().count());
            let rendered = if colorize_status && i == 1 {
                match cell.as_str() {
                    "PASS" => color::green(cell),
                    "FAIL" | "ERROR" => color::red(cell),
                    _ => color::gray(cell),
                }
            } else {
                cell.clone()
            };
            line.push_str(&rendered);
            line.push_str(&padding);
            if i + 1 < cells.len() {
                line.push_str("  ");
            }
        }
        writeln!(w, "  {}", line.trim_end())
    };

    let header_cells: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    print_row(w, &header_cells, false)?;
    let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    print_row(w, &separator, false)?;
    for row in &rows {
        print_row(w, row, true)?;
    }
    writeln!(w)?;

    print_overall_stats(w, results)?;

    if verbose {
        print_detailed_breakdown(w, results)?;
    }

    Ok(())
}

fn print_overall_stats<W: Write>(w: &mut W, results: &[EvalRunResult]) -> std::io::Result<()> {
    let total = results.len();
    let passed = results.iter().filter(|r| !r.is_failure()).count();
    let failed = total - passed;

    let mut total_duration_ms = 0u64;
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;
    let mut cache_creation = 0u64;
    let mut cache_read = 0u64;
    for result in results {
        if let Some(trace) = &result.trace {
            total_duration_ms += trace.total_duration_ms;
            input_tokens += trace.total_input_tokens;
            output_tokens += trace.total_output_tokens;
            cache_creation += trace.total_cache_creation_tokens;
            cache_read += trace.total_cache_read_tokens;
        }
    }

    writeln!(w, "{}", color::bold("## Overall"))?;
    let passed_label = if failed == 0 {
        color::green(&format!("{passed}/{total} passed"))
    } else {
        color::red(&format!("{passed}/{total} passed"))
    };
    writeln!(w, "  Results:  {passed_label}")?;
    writeln!(w, "  Duration: {}", format_duration_ms(total_duration_ms))?;
    writeln!(w, "  Tokens:   {input_tokens} in, {output_tokens} out")?;
    if cache_creation > 0 || cache_read > 0 {
        writeln!(
            w,
            "  Cache:    {cache_creation} created, {cache_read} read"
        )?;
    }
    writeln!(w)?;
    Ok(())
}

fn print_detailed_breakdown<W: Write>(
    w: &mut W,
    results: &[EvalRunResult],
) -> std::io::Result<()> {
    writeln!(w, "{}", color::bold("## Details"))?;

    for result in results {
        let (status, colorize) = status_of(result);
        writeln!(
            w,
            "\n{} {}",
            colorize(if status == "PASS" {
                color::check_mark()
            } else {
                color::x_mark()
            }),
            color::bold(&result.eval.name)
        )?;

        if !result.eval.description.is_empty() {
            writeln!(w, "    {}", color::gray(&result.eval.description))?;
        }

        if let Some(error) = &result.error {
            writeln!(w, "    {}", color::red(&format!("error: {error}")))?;
        }

        if let Some(grade) = &result.grade {
            writeln!(
                w,
                "    scores: accuracy {} | completeness {} | relevance {} | clarity {} | reasoning {}",
                grade.accuracy, grade.completeness, grade.relevance, grade.clarity, grade.reasoning
            )?;
            if !grade.overall_comment.is_empty() {
                writeln!(w, "    comment: {}", grade.overall_comment)?;
            }
        }

        if let Some(trace) = &result.trace {
            for step in &trace.steps {
                writeln!(
                    w,
                    "    step {}: {} ({} in, {} out, {}ms)",
                    step.step_number,
                    if step.stop_reason.is_empty() {
                        "?"
                    } else {
                        &step.stop_reason
                    },
                    step.input_tokens,
                    step.output_tokens,
                    step.duration_ms
                )?;
                for call in &step.tool_calls {
                    let mark = if call.success {
                        color::green(color::check_mark())
                    } else {
                        color::red(color::x_mark())
                    };
                    writeln!(
                        w,
                        "      {} {} {} ({}ms)",
                        mark,
                        call.tool_name,
                        color::gray(&call.input.to_string()),
                        call.duration_ms
                    )?;
                }
                if let Some(error) = &step.error {
                    writeln!(w, "      {}", color::red(error))?;
                }
            }
        }
    }

    writeln!(w)?;
    Ok(())
}

fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgrade_core::AgenticStep;

    fn sample_eval(name: &str) -> Eval {
        Eval {
            name: name.to_string(),
            description: String::new(),
            prompt: "What is 5 plus 3?".to_string(),
            expected_result: String::new(),
            agent_system_prompt: String::new(),
            grading_rubric: None,
        }
    }

    fn sample_grade() -> GradeResult {
        GradeResult {
            accuracy: 5,
            completeness: 4,
            relevance: 5,
            clarity: 4,
            reasoning: 4,
            overall_comment: "good".to_string(),
        }
    }

    fn sample_trace() -> EvalTrace {
        let mut step = AgenticStep::begin(1);
        step.input_tokens = 100;
        step.output_tokens = 20;
        step.stop_reason = "end_turn".to_string();
        step.complete();
        let mut trace = EvalTrace {
            steps: vec![step],
            ..Default::default()
        };
        trace.aggregate_steps();
        trace
    }

    fn sample_result(name: &str) -> EvalRunResult {
        EvalRunResult {
            eval: sample_eval(name),
            result: None,
            grade: Some(sample_grade()),
            error: None,
            trace: Some(sample_trace()),
        }
    }

    #[test]
    fn test_round_trip_trace_file() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![sample_result("basic-addition")];
        write_traces(&results, dir.path()).unwrap();

        let path = dir.path().join("basic-addition.json");
        assert!(path.exists());

        let loaded = load_trace_file(&path).unwrap();
        assert_eq!(loaded.eval.name, "basic-addition");
        assert_eq!(loaded.grade.as_ref().unwrap().accuracy, 5);
        let trace = loaded.trace.unwrap();
        assert_eq!(trace.step_count, 1);
        assert_eq!(trace.total_input_tokens, 100);
    }

    #[test]
    fn test_load_legacy_bare_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old-style-eval.json");
        let trace_json = serde_json::to_string(&sample_trace()).unwrap();
        std::fs::write(&path, trace_json).unwrap();

        let loaded = load_trace_file(&path).unwrap();
        assert_eq!(loaded.eval.name, "old-style-eval", "name from file stem");
        assert!(loaded.grade.is_none());
        assert_eq!(loaded.trace.unwrap().total_input_tokens, 100);
    }

    #[test]
    fn test_build_row_for_pass_and_error() {
        let row = build_row(&sample_result("basic-addition"));
        assert_eq!(row[0], "basic-addition");
        assert_eq!(row[1], "PASS");
        assert_eq!(row[2], "4.4");
        assert_eq!(row[3], "1");
        assert_eq!(row[6], "100→20");

        let errored = EvalRunResult {
            eval: sample_eval("broken"),
            result: None,
            grade: None,
            error: Some(mcpgrade_core::EvalError::Spawn("no such file".to_string())),
            trace: None,
        };
        let row = build_row(&errored);
        assert_eq!(row[1], "ERROR");
        assert_eq!(row[2], "-");
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short"), "short");
        let long = "a-very-long-eval-name-that-keeps-going";
        let truncated = truncate_name(long);
        assert_eq!(truncated.chars().count(), 25);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_print_report_renders_table() {
        std::env::set_var("CI", "true");
        let mut out = Vec::new();
        print_report(&mut out, &[sample_result("basic-addition")], true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Evaluation Summary"));
        assert!(text.contains("basic-addition"));
        assert!(text.contains("PASS"));
        assert!(text.contains("1/1 passed"));
        assert!(text.contains("step 1: end_turn"));
    }
}
