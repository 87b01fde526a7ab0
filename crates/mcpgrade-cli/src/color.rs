//! ANSI styling for report output, disabled under CI.
//!
//! CI log collectors tend to mangle escape codes, so when `CI=true` every
//! helper returns plain text and the pass/fail marks fall back to ASCII.

use std::sync::OnceLock;

static IS_CI: OnceLock<bool> = OnceLock::new();

fn is_ci() -> bool {
    *IS_CI.get_or_init(|| std::env::var("CI").map(|v| v == "true").unwrap_or(false))
}

fn paint(code: &str, s: &str) -> String {
    if is_ci() {
        s.to_string()
    } else {
        format!("\x1b[{code}m{s}\x1b[0m")
    }
}

/// Red text (errors, failures).
pub fn red(s: &str) -> String {
    paint("31", s)
}

/// Green text (success, pass).
pub fn green(s: &str) -> String {
    paint("32", s)
}

/// Cyan text (headings).
pub fn cyan(s: &str) -> String {
    paint("36", s)
}

/// Gray/dim text (muted detail).
pub fn gray(s: &str) -> String {
    paint("90", s)
}

/// Bold text.
pub fn bold(s: &str) -> String {
    paint("1", s)
}

/// Pass check mark.
pub fn check_mark() -> &'static str {
    if is_ci() {
        "[PASS]"
    } else {
        "✓"
    }
}

/// Fail X mark.
pub fn x_mark() -> &'static str {
    if is_ci() {
        "[FAIL]"
    } else {
        "✗"
    }
}
