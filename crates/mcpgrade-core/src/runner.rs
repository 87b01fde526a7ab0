//! The eval runtime: agentic loop, tool-call tracing, and batch orchestration.
//!
//! One eval run spawns a fresh MCP session, drives a bounded conversation
//! between the LLM and the server's tools, records every step in the trace,
//! then grades the accumulated answer. Fatal errors (spawn, handshake,
//! stream) abort the eval but keep the partial trace; tool failures are fed
//! back to the model, which may retry within the remaining step budget.

use std::time::Instant;

use chrono::Utc;

use mcpgrade_llm::{
    CacheControl, Client, ContentBlock, Message, MessagesRequest, StopReason, SystemBlock,
    ToolDefinition,
};
use mcpgrade_mcp::{McpContent, McpSession};

use crate::config::{CacheTtl, ClientConfig};
use crate::error::EvalError;
use crate::eval::Eval;
use crate::grader;
use crate::trace::{AgenticStep, EvalResult, EvalRunResult, EvalTrace, ToolCall};

/// Built-in system prompt for the agent under evaluation.
pub const AGENT_SYSTEM_PROMPT: &str = "You are an assistant responsible for evaluating the results of calling various tools. Given the user's query, use the tools available to you to answer the question.";

/// Resolve the agent system prompt: eval override > client override >
/// built-in default.
pub(crate) fn resolve_agent_prompt(client_prompt: Option<&str>, eval: &Eval) -> String {
    if !eval.agent_system_prompt.is_empty() {
        return eval.agent_system_prompt.clone();
    }
    if let Some(prompt) = client_prompt {
        if !prompt.is_empty() {
            return prompt.to_string();
        }
    }
    AGENT_SYSTEM_PROMPT.to_string()
}

/// Flatten MCP content blocks to one string: text verbatim, image and
/// resource blocks rendered as placeholders.
fn flatten_content(content: &[McpContent]) -> String {
    content
        .iter()
        .map(|block| match block {
            McpContent::Text(text) => text.clone(),
            McpContent::Image { mime_type, .. } => format!("[Image: {mime_type}]"),
            McpContent::Resource { uri, .. } => format!("[Resource: {uri}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Execute one tool call through the session and capture a completed
/// [`ToolCall`] record. Never fails: transport and tool-level errors are
/// recorded as `success = false` with the error encoded in `output`.
async fn execute_traced_call(
    session: &McpSession,
    tool_id: &str,
    tool_name: &str,
    input: &serde_json::Value,
) -> ToolCall {
    let start_time = Utc::now();
    let timer = Instant::now();

    let mut call = ToolCall {
        tool_id: tool_id.to_string(),
        tool_name: tool_name.to_string(),
        start_time,
        end_time: start_time,
        duration_ms: 0,
        input: input.clone(),
        output: serde_json::Value::Null,
        success: false,
        error: String::new(),
    };

    let outcome = session.call_tool(tool_name, input.clone()).await;

    call.end_time = Utc::now();
    call.duration_ms = timer.elapsed().as_millis() as u64;

    record_outcome(&mut call, outcome);
    call
}

/// Fold a call outcome into the record. Success stores the flattened content
/// under a `{"result": ...}` envelope; tool-level and transport failures both
/// store `{"error": ...}` with a non-empty error string.
fn record_outcome(
    call: &mut ToolCall,
    outcome: Result<mcpgrade_mcp::McpToolResult, mcpgrade_mcp::SessionError>,
) {
    match outcome {
        Ok(result) if !result.is_error => {
            call.success = true;
            call.output = serde_json::json!({ "result": flatten_content(&result.content) });
        }
        Ok(result) => {
            // The server executed the tool and reported a failure.
            call.error = flatten_content(&result.content);
            if call.error.is_empty() {
                call.error = "tool reported an error".to_string();
            }
            call.output = serde_json::json!({ "error": call.error });
        }
        Err(e) => {
            call.error = e.to_string();
            call.output = serde_json::json!({ "error": call.error });
        }
    }
}

/// Runs evals against one MCP server configuration.
///
/// Owns the LLM client for its lifetime; the batch orchestrator holds one
/// `EvalClient` and passes it through every eval.
pub struct EvalClient {
    llm: Client,
    config: ClientConfig,
}

impl EvalClient {
    pub fn new(config: ClientConfig) -> Self {
        let llm = Client::new(&config.api_key, config.base_url.clone());
        Self { llm, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn cache_control(&self) -> Option<CacheControl> {
        if !self.config.enable_prompt_caching {
            return None;
        }
        Some(match self.config.cache_ttl {
            CacheTtl::FiveMinutes => CacheControl::ephemeral(),
            CacheTtl::OneHour => CacheControl::ephemeral().with_ttl("1h"),
        })
    }

    /// Convert the tool catalog to LLM tool definitions, with one cache
    /// breakpoint on the last entry when caching is enabled.
    fn build_tools(&self, catalog: &[mcpgrade_mcp::McpTool]) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> =
            catalog.iter().map(|tool| tool.to_tool_definition()).collect();
        if let Some(last) = tools.last_mut() {
            last.cache_control = self.cache_control();
        }
        tools
    }

    /// Run a single eval: spawn the server, drive the agentic loop, grade the
    /// answer, and enforce rubric minimums. Fatal errors land in
    /// `EvalRunResult::error` with the partial trace preserved.
    pub async fn run_eval(&self, eval: &Eval) -> EvalRunResult {
        let overall_start = Instant::now();
        let mut trace = EvalTrace::default();
        let mut run = EvalRunResult {
            eval: eval.clone(),
            result: None,
            grade: None,
            error: None,
            trace: None,
        };

        match self.drive_agent(eval, &mut trace).await {
            Ok(eval_result) => {
                trace.aggregate_steps();

                let (graded, grading_trace) = grader::grade_with_trace(
                    &self.llm,
                    &self.config,
                    eval,
                    &eval_result,
                    &trace,
                )
                .await;
                trace.grading = Some(grading_trace);

                match graded {
                    Ok(grade) => {
                        if self.config.enforce_minimum_scores {
                            if let Some(rubric) = &eval.grading_rubric {
                                if let Err(score_error) = rubric.check_minimum_scores(&grade) {
                                    tracing::warn!(
                                        eval = %eval.name,
                                        error = %score_error,
                                        "eval failed minimum score requirements"
                                    );
                                    run.error = Some(EvalError::MinimumScore(score_error));
                                }
                            }
                        }
                        run.grade = Some(grade);
                    }
                    Err(grading_error) => {
                        run.error = Some(grading_error);
                    }
                }

                run.result = Some(eval_result);
            }
            Err(fatal) => {
                trace.aggregate_steps();
                run.error = Some(fatal);
            }
        }

        trace.fold_grading_cache();
        trace.total_duration_ms = overall_start.elapsed().as_millis() as u64;
        run.trace = Some(trace);
        run
    }

    /// The bounded agentic loop. Returns the accumulated answer, recording
    /// each step (including aborted ones) into `trace`.
    async fn drive_agent(
        &self,
        eval: &Eval,
        trace: &mut EvalTrace,
    ) -> Result<EvalResult, EvalError> {
        let mut session = McpSession::open(
            &self.config.mcp_command,
            &self.config.mcp_args,
            &self.config.mcp_env,
            self.config.stderr_sink.clone(),
        )
        .await
        .map_err(EvalError::from)?;

        let tools = self.build_tools(session.tools());
        let system_text = resolve_agent_prompt(self.config.agent_system_prompt.as_deref(), eval);

        let mut messages = vec![Message::user(&eval.prompt)];
        let mut final_text = String::new();

        for step_number in 1..=self.config.max_steps {
            let mut step = AgenticStep::begin(step_number);

            let request = MessagesRequest {
                model: self.config.model.clone(),
                max_tokens: self.config.max_tokens,
                system: Some(vec![SystemBlock::cached(
                    system_text.clone(),
                    self.cache_control(),
                )]),
                messages: messages.clone(),
                tools: if tools.is_empty() {
                    None
                } else {
                    Some(tools.clone())
                },
                stream: None,
            };

            let streamed = match self.llm.stream_message(&request).await {
                Ok(message) => message,
                Err(e) => {
                    step.error = Some(e.to_string());
                    step.complete();
                    trace.steps.push(step);
                    session.close().await;
                    return Err(EvalError::Stream(e.to_string()));
                }
            };

            // Every text delta counts toward the final answer, including
            // text emitted alongside tool_use blocks.
            final_text.push_str(&streamed.text);

            step.stop_reason = streamed
                .stop_reason
                .map(|reason| reason.as_str().to_string())
                .unwrap_or_default();
            step.model_response = streamed.block_text();
            step.input_tokens = streamed.usage.input_tokens;
            step.output_tokens = streamed.usage.output_tokens;
            step.cache_creation_input_tokens = streamed.usage.cache_creation_input_tokens;
            step.cache_read_input_tokens = streamed.usage.cache_read_input_tokens;

            // Assistant turn goes into history before any tool results.
            messages.push(Message::assistant(streamed.content.clone()));

            match streamed.stop_reason {
                Some(StopReason::ToolUse) => {}
                Some(StopReason::EndTurn) => {
                    step.complete();
                    trace.steps.push(step);
                    break;
                }
                Some(StopReason::MaxTokens) => {
                    // Terminates without a run-level error, but leaves a
                    // marker for anyone debugging the trace.
                    step.error = Some("response truncated at max_tokens".to_string());
                    step.complete();
                    trace.steps.push(step);
                    break;
                }
                _ => {
                    step.complete();
                    trace.steps.push(step);
                    break;
                }
            }

            // Execute tool calls sequentially, in arrival order.
            let mut tool_results: Vec<ContentBlock> = Vec::new();
            for block in &streamed.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let call = execute_traced_call(&session, id, name, input).await;

                    let content = if call.success {
                        call.output.to_string()
                    } else {
                        format!("Error calling tool: {}", call.error)
                    };
                    tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content,
                        is_error: if call.success { None } else { Some(true) },
                    });

                    step.tool_calls.push(call);
                }
            }

            step.complete();
            trace.steps.push(step);

            if tool_results.is_empty() {
                break;
            }

            messages.push(Message::tool_results(tool_results));
        }

        session.close().await;

        Ok(EvalResult {
            prompt: eval.prompt.clone(),
            raw_response: final_text,
        })
    }

    /// Run all evals sequentially in declared order. A fatal error in one
    /// eval is recorded on its result and never aborts the batch.
    pub async fn run_evals(&self, evals: &[Eval]) -> Vec<EvalRunResult> {
        self.run_evals_until(evals, None).await
    }

    /// Like [`EvalClient::run_evals`], with an optional deadline. An eval
    /// that outlives the deadline is cancelled (its in-flight request is
    /// aborted by dropping the future) and the remaining evals are marked
    /// cancelled without running.
    pub async fn run_evals_until(
        &self,
        evals: &[Eval],
        deadline: Option<tokio::time::Instant>,
    ) -> Vec<EvalRunResult> {
        let mut results = Vec::with_capacity(evals.len());

        for eval in evals {
            let cancelled = |message: String| EvalRunResult {
                eval: eval.clone(),
                result: None,
                grade: None,
                error: Some(EvalError::Cancelled(message)),
                trace: None,
            };

            let result = match deadline {
                Some(deadline) => {
                    if tokio::time::Instant::now() >= deadline {
                        results.push(cancelled("batch timeout reached".to_string()));
                        continue;
                    }
                    match tokio::time::timeout_at(deadline, self.run_eval(eval)).await {
                        Ok(result) => result,
                        Err(_) => {
                            results.push(cancelled("batch timeout reached mid-eval".to_string()));
                            continue;
                        }
                    }
                }
                None => self.run_eval(eval).await,
            };

            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpgrade_mcp::McpTool;

    fn eval_with_prompt(agent_system_prompt: &str) -> Eval {
        Eval {
            name: "x".to_string(),
            description: String::new(),
            prompt: "What is 5 plus 3?".to_string(),
            expected_result: String::new(),
            agent_system_prompt: agent_system_prompt.to_string(),
            grading_rubric: None,
        }
    }

    #[test]
    fn test_prompt_precedence_eval_beats_client() {
        let resolved = resolve_agent_prompt(Some("client-level prompt"), &eval_with_prompt("eval-level prompt"));
        assert_eq!(resolved, "eval-level prompt");
        assert!(!resolved.contains("client-level prompt"));
    }

    #[test]
    fn test_prompt_precedence_client_beats_default() {
        let resolved = resolve_agent_prompt(Some("client-level prompt"), &eval_with_prompt(""));
        assert_eq!(resolved, "client-level prompt");
    }

    #[test]
    fn test_prompt_precedence_default() {
        let resolved = resolve_agent_prompt(None, &eval_with_prompt(""));
        assert_eq!(resolved, AGENT_SYSTEM_PROMPT);
        let resolved = resolve_agent_prompt(Some(""), &eval_with_prompt(""));
        assert_eq!(resolved, AGENT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_flatten_content_variants() {
        let flattened = flatten_content(&[
            McpContent::Text("8".to_string()),
            McpContent::Image {
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
            },
            McpContent::Resource {
                uri: "file:///tmp/data.txt".to_string(),
                text: Some("ignored".to_string()),
            },
        ]);
        assert_eq!(flattened, "8\n[Image: image/png]\n[Resource: file:///tmp/data.txt]");
    }

    fn blank_call() -> ToolCall {
        let now = chrono::Utc::now();
        ToolCall {
            tool_id: "toolu_1".to_string(),
            tool_name: "add".to_string(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            input: serde_json::json!({"a": 5, "b": 3}),
            output: serde_json::Value::Null,
            success: false,
            error: String::new(),
        }
    }

    #[test]
    fn test_record_outcome_success_envelope() {
        let mut call = blank_call();
        record_outcome(
            &mut call,
            Ok(mcpgrade_mcp::McpToolResult {
                content: vec![McpContent::Text("8".to_string())],
                is_error: false,
            }),
        );
        assert!(call.success);
        assert!(call.error.is_empty());
        assert_eq!(call.output, serde_json::json!({"result": "8"}));
    }

    #[test]
    fn test_record_outcome_tool_level_failure() {
        let mut call = blank_call();
        record_outcome(
            &mut call,
            Ok(mcpgrade_mcp::McpToolResult {
                content: vec![McpContent::Text("first call always fails".to_string())],
                is_error: true,
            }),
        );
        assert!(!call.success);
        assert_eq!(call.error, "first call always fails");
        assert_eq!(
            call.output,
            serde_json::json!({"error": "first call always fails"})
        );
    }

    #[test]
    fn test_record_outcome_transport_failure() {
        let mut call = blank_call();
        record_outcome(
            &mut call,
            Err(mcpgrade_mcp::SessionError::Call("pipe closed".to_string())),
        );
        assert!(!call.success);
        assert!(!call.error.is_empty());
        // The output always encodes the error as JSON with an `error` key
        assert!(call.output.get("error").is_some());
        assert!(call.output["error"].as_str().unwrap().contains("pipe closed"));
    }

    #[test]
    fn test_record_outcome_empty_error_content_gets_placeholder() {
        let mut call = blank_call();
        record_outcome(
            &mut call,
            Ok(mcpgrade_mcp::McpToolResult {
                content: vec![],
                is_error: true,
            }),
        );
        assert!(!call.success);
        assert!(!call.error.is_empty());
    }

    #[test]
    fn test_build_tools_marks_only_last_entry() {
        let config = ClientConfig::new("key", "claude-sonnet-4-5", "./server");
        let client = EvalClient::new(config);

        let catalog = vec![
            McpTool {
                name: "add".to_string(),
                description: Some("adds".to_string()),
                input_schema: serde_json::json!({"type":"object","properties":{"a":{}}}),
            },
            McpTool {
                name: "echo".to_string(),
                description: Some("echoes".to_string()),
                input_schema: serde_json::json!({"type":"object","properties":{"message":{}}}),
            },
        ];

        let tools = client.build_tools(&catalog);
        assert_eq!(tools.len(), 2);
        assert!(tools[0].cache_control.is_none());
        let marker = tools[1].cache_control.as_ref().expect("last tool cached");
        assert_eq!(marker.cache_type, "ephemeral");
        assert!(marker.ttl.is_none(), "5m is the implicit default TTL");
    }

    #[test]
    fn test_build_tools_ttl_and_disabled_caching() {
        let mut config = ClientConfig::new("key", "claude-sonnet-4-5", "./server");
        config.cache_ttl = CacheTtl::OneHour;
        let client = EvalClient::new(config);
        let catalog = vec![McpTool {
            name: "add".to_string(),
            description: None,
            input_schema: serde_json::json!({}),
        }];
        let tools = client.build_tools(&catalog);
        assert_eq!(
            tools[0].cache_control.as_ref().unwrap().ttl.as_deref(),
            Some("1h")
        );

        let mut config = ClientConfig::new("key", "claude-sonnet-4-5", "./server");
        config.enable_prompt_caching = false;
        let client = EvalClient::new(config);
        let tools = client.build_tools(&catalog);
        assert!(tools[0].cache_control.is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_recorded_not_thrown() {
        let config = ClientConfig::new("key", "claude-sonnet-4-5", "/nonexistent/mcp-server");
        let client = EvalClient::new(config);
        let result = client.run_eval(&eval_with_prompt("")).await;

        assert!(matches!(result.error, Some(EvalError::Spawn(_))));
        assert!(result.result.is_none());
        assert!(result.grade.is_none());
        let trace = result.trace.expect("trace present even on spawn failure");
        assert_eq!(trace.step_count, 0);
        assert!(trace.steps.is_empty());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let config = ClientConfig::new("key", "claude-sonnet-4-5", "/nonexistent/mcp-server");
        let client = EvalClient::new(config);
        let evals = vec![eval_with_prompt(""), eval_with_prompt("")];
        let results = client.run_evals(&evals).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.is_failure());
            assert!(matches!(result.error, Some(EvalError::Spawn(_))));
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_marks_evals_cancelled() {
        let config = ClientConfig::new("key", "claude-sonnet-4-5", "/nonexistent/mcp-server");
        let client = EvalClient::new(config);
        let evals = vec![eval_with_prompt("")];
        let deadline = tokio::time::Instant::now();
        let results = client.run_evals_until(&evals, Some(deadline)).await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].error, Some(EvalError::Cancelled(_))));
    }
}
