//! JSON extraction from LLM grading responses.
//!
//! Graders are instructed to emit raw JSON, but models wrap answers in
//! markdown fences or prose anyway. Strategies are tried in order; the first
//! one whose output parses as valid JSON wins. When everything fails the
//! fence-stripped text is returned so the caller's parse error carries the
//! raw material.

use std::sync::OnceLock;

use regex::Regex;

/// Extract JSON from a response string using multiple strategies.
pub fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    // Strategy 1: direct parse (fastest path)
    if is_valid_json(trimmed) {
        return trimmed.to_string();
    }

    // Strategy 2: strip markdown fences
    let cleaned = strip_markdown_fences(trimmed);
    if is_valid_json(&cleaned) {
        return cleaned;
    }

    // Strategy 3: outermost-brace regex extraction
    if let Some(extracted) = extract_with_regex(trimmed) {
        if is_valid_json(&extracted) {
            return extracted;
        }
    }

    // Strategy 4: line-by-line scan tracking brace/bracket depth
    if let Some(extracted) = extract_by_scanning(trimmed) {
        if is_valid_json(&extracted) {
            return extracted;
        }
    }

    cleaned
}

fn is_valid_json(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    serde_json::from_str::<serde_json::Value>(s).is_ok()
}

fn strip_markdown_fences(s: &str) -> String {
    let mut cleaned = s.trim();
    cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    cleaned.trim().to_string()
}

fn extract_with_regex(s: &str) -> Option<String> {
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    static ARRAY: OnceLock<Regex> = OnceLock::new();

    // Greedy match spans from the first opening to the last closing brace.
    let object = OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
    if let Some(found) = object.find(s) {
        return Some(found.as_str().trim().to_string());
    }

    let array = ARRAY.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));
    array.find(s).map(|found| found.as_str().trim().to_string())
}

fn extract_by_scanning(s: &str) -> Option<String> {
    let mut json_lines: Vec<&str> = Vec::new();
    let mut in_json = false;
    let mut brace_count = 0i64;
    let mut bracket_count = 0i64;

    for line in s.lines() {
        let trimmed_line = line.trim();

        if !in_json && trimmed_line.is_empty() {
            continue;
        }

        if !in_json && (trimmed_line.starts_with('{') || trimmed_line.starts_with('[')) {
            in_json = true;
        }

        if in_json {
            json_lines.push(line);

            for ch in line.chars() {
                match ch {
                    '{' => brace_count += 1,
                    '}' => brace_count -= 1,
                    '[' => bracket_count += 1,
                    ']' => bracket_count -= 1,
                    _ => {}
                }
            }

            if brace_count == 0 && bracket_count == 0 && !json_lines.is_empty() {
                return Some(json_lines.join("\n").trim().to_string());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn round_trips(extracted: &str, expected: &Value) {
        let parsed: Value = serde_json::from_str(extracted).expect("extracted text parses");
        assert_eq!(&parsed, expected);
    }

    fn grade_json() -> Value {
        serde_json::json!({
            "accuracy": 5,
            "completeness": 4,
            "relevance": 5,
            "clarity": 4,
            "reasoning": 4,
            "overall_comments": "Clear and correct."
        })
    }

    #[test]
    fn test_raw_json() {
        let input = grade_json().to_string();
        round_trips(&extract_json(&input), &grade_json());
    }

    #[test]
    fn test_fenced_json() {
        let input = format!("```json\n{}\n```", grade_json());
        round_trips(&extract_json(&input), &grade_json());

        let input = format!("```\n{}\n```", grade_json());
        round_trips(&extract_json(&input), &grade_json());
    }

    #[test]
    fn test_prose_before_json() {
        let input = format!(
            "Here is my evaluation of the answer:\n\n{}",
            serde_json::to_string_pretty(&grade_json()).unwrap()
        );
        round_trips(&extract_json(&input), &grade_json());
    }

    #[test]
    fn test_json_with_trailing_prose() {
        let input = format!(
            "{}\n\nLet me know if you need more detail.",
            serde_json::to_string_pretty(&grade_json()).unwrap()
        );
        round_trips(&extract_json(&input), &grade_json());
    }

    #[test]
    fn test_escaped_quotes_and_multiline_strings() {
        let expected = serde_json::json!({
            "accuracy": 3,
            "overall_comments": "The answer quoted \"8\" correctly.\nIt was otherwise terse."
        });
        let input = format!("```json\n{}\n```", expected);
        round_trips(&extract_json(&input), &expected);
    }

    #[test]
    fn test_array_extraction() {
        let input = "Scores follow:\n[1, 2, 3]";
        round_trips(&extract_json(input), &serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_unparseable_input_returns_fence_stripped_text() {
        let input = "```\nnot json at all\n```";
        assert_eq!(extract_json(input), "not json at all");
    }
}
