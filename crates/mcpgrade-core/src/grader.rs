//! Grading: prompt assembly, the grading completion call, and score parsing.

use mcpgrade_llm::{CacheControl, Client, Message, MessagesRequest, SystemBlock};

use crate::config::ClientConfig;
use crate::error::EvalError;
use crate::eval::Eval;
use crate::extract::extract_json;
use crate::rubric::DimensionCriteria;
use crate::trace::{EvalResult, EvalTrace, GradeResult, GradingTrace};

/// Token budget for the grading completion.
const GRADING_MAX_TOKENS: u32 = 1000;

/// System prompt for the grading call. The grader must return raw JSON only.
pub const GRADING_SYSTEM_PROMPT: &str = r#"You are an expert evaluator assessing how well an LLM answers a given question. Review the provided answer and score it from 1 to 5 in each of the following categories:

- Accuracy: Does the answer contain factual errors or hallucinations?
- Completeness: Does the answer fully address all parts of the question?
- Relevance: Is the information directly related to the question?
- Clarity: Is the explanation easy to understand and well-structured?
- Reasoning: Does the answer show logical thinking or provide evidence or rationale?

If custom grading criteria are provided below, use those specific requirements to inform your scoring. The custom criteria define what "complete", "accurate", etc. mean for this particular evaluation.

CRITICAL: Return ONLY a valid JSON object with no markdown formatting, no code blocks, and no explanation. Your entire response must be valid JSON starting with { and ending with }.

Use this exact format:
{
    "accuracy": 1-5,
    "completeness": 1-5,
    "relevance": 1-5,
    "clarity": 1-5,
    "reasoning": 1-5,
    "overall_comments": "A short paragraph summarizing the strengths and weaknesses of the answer, specifically noting which rubric criteria were met or missed if custom criteria were provided."
}"#;

fn format_dimension_criteria(dimension: &str, criteria: &DimensionCriteria) -> String {
    let mut section = format!("### {dimension}\n");

    if !criteria.description.is_empty() {
        section.push_str(&format!("{}\n\n", criteria.description));
    }

    if !criteria.must_have.is_empty() {
        section.push_str("**Must have for high scores (4-5):**\n");
        for item in &criteria.must_have {
            section.push_str(&format!("- {item}\n"));
        }
        section.push('\n');
    }

    if !criteria.nice_to_have.is_empty() {
        section.push_str("**Nice to have:**\n");
        for item in &criteria.nice_to_have {
            section.push_str(&format!("- {item}\n"));
        }
        section.push('\n');
    }

    if !criteria.penalties.is_empty() {
        section.push_str("**Score reductions:**\n");
        for item in &criteria.penalties {
            section.push_str(&format!("- {item}\n"));
        }
        section.push('\n');
    }

    section
}

/// Build the grading user message: the eval prompt and answer, the tool
/// execution context when tools were called, and the rubric sections when a
/// rubric is configured.
pub fn build_grading_prompt(eval: &Eval, eval_result: &EvalResult, exec_trace: &EvalTrace) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("Here is the user input: {}\n", eval_result.prompt));
    prompt.push_str(&format!(
        "Here is the LLM's answer: {}\n",
        eval_result.raw_response
    ));

    if exec_trace.tool_call_count > 0 {
        prompt.push_str("\n\nTool Execution Context:\n");
        prompt.push_str(
            "The LLM had access to and successfully called the following tools to gather information:\n",
        );
        for step in &exec_trace.steps {
            for tool_call in &step.tool_calls {
                prompt.push_str(&format!("\n- Tool: '{}'\n", tool_call.tool_name));
                if tool_call.success {
                    prompt.push_str("  Status: SUCCESS\n");
                    if !tool_call.output.is_null() {
                        // Include the actual tool output so the grader can
                        // verify data accuracy.
                        prompt.push_str(&format!("  Returned data: {}\n", tool_call.output));
                    }
                } else {
                    prompt.push_str(&format!("  Status: FAILED - {}\n", tool_call.error));
                }
            }
        }
        prompt.push_str(
            "\nThe LLM's answer should be evaluated based on how well it used this tool-provided data.\n",
        );
    }

    if let Some(rubric) = &eval.grading_rubric {
        prompt.push_str("\n\n## Custom Grading Criteria\n\n");
        prompt.push_str("Use the following specific criteria when scoring this response:\n\n");

        let sections = [
            ("Accuracy", &rubric.accuracy),
            ("Completeness", &rubric.completeness),
            ("Relevance", &rubric.relevance),
            ("Clarity", &rubric.clarity),
            ("Reasoning", &rubric.reasoning),
        ];
        for (dimension, criteria) in sections {
            if let Some(criteria) = criteria {
                prompt.push_str(&format_dimension_criteria(dimension, criteria));
            }
        }

        if !rubric.minimum_scores.is_empty() {
            prompt.push_str("\n### Minimum Acceptable Scores:\n");
            for (dimension, score) in &rubric.minimum_scores {
                prompt.push_str(&format!("- {dimension}: {score}/5\n"));
            }
        }
    }

    prompt
}

/// Grade an eval result, returning the grade (or the grading error) together
/// with the full grading trace.
pub(crate) async fn grade_with_trace(
    llm: &Client,
    config: &ClientConfig,
    eval: &Eval,
    eval_result: &EvalResult,
    exec_trace: &EvalTrace,
) -> (Result<GradeResult, EvalError>, GradingTrace) {
    let mut trace = GradingTrace::begin(eval, &eval_result.raw_response);

    let grading_prompt = build_grading_prompt(eval, eval_result, exec_trace);
    trace.grading_prompt = grading_prompt.clone();

    let model = config
        .grading_model
        .clone()
        .unwrap_or_else(|| config.model.clone());

    let cache_control = if config.enable_prompt_caching {
        Some(match config.cache_ttl {
            crate::config::CacheTtl::OneHour => CacheControl::ephemeral().with_ttl("1h"),
            crate::config::CacheTtl::FiveMinutes => CacheControl::ephemeral(),
        })
    } else {
        None
    };

    let request = MessagesRequest {
        model,
        max_tokens: GRADING_MAX_TOKENS,
        system: Some(vec![SystemBlock::cached(
            GRADING_SYSTEM_PROMPT,
            cache_control,
        )]),
        messages: vec![Message::user(grading_prompt)],
        tools: None,
        stream: None,
    };

    let response = llm.complete(&request).await;
    trace.complete();

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            trace.error = Some(e.to_string());
            return (
                Err(EvalError::Grading(format!(
                    "failed to get grading response: {e}"
                ))),
                trace,
            );
        }
    };

    let raw_output = response.text();
    trace.raw_grading_output = raw_output.clone();
    trace.input_tokens = response.usage.input_tokens;
    trace.output_tokens = response.usage.output_tokens;
    trace.cache_creation_input_tokens = response.usage.cache_creation_input_tokens;
    trace.cache_read_input_tokens = response.usage.cache_read_input_tokens;

    let cleaned = extract_json(&raw_output);
    match serde_json::from_str::<GradeResult>(&cleaned) {
        Ok(grade) => (Ok(grade), trace),
        Err(e) => {
            trace.error = Some(e.to_string());
            (
                Err(EvalError::Grading(format!(
                    "failed to parse grading response: {e}"
                ))),
                trace,
            )
        }
    }
}
