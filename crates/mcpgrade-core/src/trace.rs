//! Execution trace data model.
//!
//! One [`EvalTrace`] is captured per eval run: ordered agentic steps with
//! per-step token and timing detail, the tool calls each step made, and an
//! optional grading trace. All trace appends happen on the coordinating task,
//! so no locking is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::eval::Eval;

/// Complete execution history of an evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalTrace {
    /// Each step in the agentic loop
    pub steps: Vec<AgenticStep>,
    /// Grading interaction details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading: Option<GradingTrace>,
    /// Total execution time
    #[serde(default)]
    pub total_duration_ms: u64,
    /// Sum of input tokens across all steps
    #[serde(default)]
    pub total_input_tokens: u64,
    /// Sum of output tokens across all steps
    #[serde(default)]
    pub total_output_tokens: u64,
    /// Number of agentic steps executed
    #[serde(default)]
    pub step_count: usize,
    /// Total number of tool calls made
    #[serde(default)]
    pub tool_call_count: usize,
    /// Cache creation tokens across all steps, plus grading
    #[serde(default)]
    pub total_cache_creation_tokens: u64,
    /// Cache read tokens across all steps, plus grading
    #[serde(default)]
    pub total_cache_read_tokens: u64,
}

impl EvalTrace {
    /// Recompute the per-step aggregates. Called once after the loop ends.
    pub fn aggregate_steps(&mut self) {
        self.step_count = self.steps.len();
        self.total_input_tokens = self.steps.iter().map(|s| s.input_tokens).sum();
        self.total_output_tokens = self.steps.iter().map(|s| s.output_tokens).sum();
        self.tool_call_count = self.steps.iter().map(|s| s.tool_calls.len()).sum();
        self.total_cache_creation_tokens = self
            .steps
            .iter()
            .map(|s| s.cache_creation_input_tokens)
            .sum();
        self.total_cache_read_tokens = self.steps.iter().map(|s| s.cache_read_input_tokens).sum();
    }

    /// Add the grading call's cache metrics to the cache totals. Grading
    /// tokens are tracked in the grading trace, not in the token totals.
    pub fn fold_grading_cache(&mut self) {
        if let Some(grading) = &self.grading {
            self.total_cache_creation_tokens += grading.cache_creation_input_tokens;
            self.total_cache_read_tokens += grading.cache_read_input_tokens;
        }
    }
}

/// A single iteration of the agentic loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgenticStep {
    /// 1-indexed step number
    pub step_number: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    /// Text content from the assistant in this step
    #[serde(default)]
    pub model_response: String,
    /// end_turn, tool_use, max_tokens, etc.
    #[serde(default)]
    pub stop_reason: String,
    /// Tools executed in this step
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// Error message if the step aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgenticStep {
    /// Start recording a step. Instantiated before the LLM call is made.
    pub fn begin(step_number: usize) -> Self {
        let now = Utc::now();
        Self {
            step_number,
            start_time: now,
            end_time: now,
            duration_ms: 0,
            model_response: String::new(),
            stop_reason: String::new(),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
            error: None,
        }
    }

    /// Stamp the end time and duration.
    pub fn complete(&mut self) {
        self.end_time = Utc::now();
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds().max(0) as u64;
    }
}

/// One tool invocation, with timing and the raw input/output JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id from the model's tool_use block
    pub tool_id: String,
    pub tool_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    /// Tool arguments as JSON
    pub input: serde_json::Value,
    /// Tool result as JSON; on failure a `{"error": "..."}` object
    pub output: serde_json::Value,
    pub success: bool,
    /// Error message if the tool failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// The grading interaction with the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingTrace {
    /// Original eval prompt
    pub user_prompt: String,
    /// Model's answer being graded
    pub model_response: String,
    /// Expected result description
    #[serde(default)]
    pub expected_result: String,
    /// Full prompt sent to the grader
    #[serde(default)]
    pub grading_prompt: String,
    /// Complete LLM response before parsing
    #[serde(default)]
    pub raw_grading_output: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GradingTrace {
    pub fn begin(eval: &Eval, raw_response: &str) -> Self {
        let now = Utc::now();
        Self {
            user_prompt: eval.prompt.clone(),
            model_response: raw_response.to_string(),
            expected_result: eval.expected_result.clone(),
            grading_prompt: String::new(),
            raw_grading_output: String::new(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
            error: None,
        }
    }

    /// Stamp the end time and duration.
    pub fn complete(&mut self) {
        self.end_time = Utc::now();
        self.duration_ms = (self.end_time - self.start_time).num_milliseconds().max(0) as u64;
    }
}

/// The agent's answer for one eval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    /// Echo of the eval prompt
    pub prompt: String,
    /// Concatenation of every text delta streamed across all steps
    pub raw_response: String,
}

/// Five integer scores in 1..=5 plus an overall comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResult {
    pub accuracy: i32,
    pub completeness: i32,
    pub relevance: i32,
    pub clarity: i32,
    pub reasoning: i32,
    #[serde(rename = "overall_comments", default)]
    pub overall_comment: String,
}

impl GradeResult {
    /// Score for a dimension by name; None for unknown names.
    pub fn score(&self, dimension: &str) -> Option<i32> {
        match dimension {
            "accuracy" => Some(self.accuracy),
            "completeness" => Some(self.completeness),
            "relevance" => Some(self.relevance),
            "clarity" => Some(self.clarity),
            "reasoning" => Some(self.reasoning),
            _ => None,
        }
    }

    /// Average across the five dimensions.
    pub fn average(&self) -> f64 {
        let sum = self.accuracy + self.completeness + self.relevance + self.clarity + self.reasoning;
        f64::from(sum) / 5.0
    }
}

/// An eval definition combined with its execution outcome.
///
/// A successful run has `result` and `grade` and no `error`. A grading
/// failure keeps `result` and the partial grading trace and sets `error`. A
/// minimum-score violation keeps `grade` and the full trace and sets `error`.
#[derive(Debug)]
pub struct EvalRunResult {
    pub eval: Eval,
    pub result: Option<EvalResult>,
    pub grade: Option<GradeResult>,
    pub error: Option<EvalError>,
    /// Complete execution trace; present whenever the loop started
    pub trace: Option<EvalTrace>,
}

impl EvalRunResult {
    /// An eval fails when it errored or its average grade is below 3.0.
    pub fn is_failure(&self) -> bool {
        if self.error.is_some() {
            return true;
        }
        self.grade
            .as_ref()
            .map(|grade| grade.average() < 3.0)
            .unwrap_or(false)
    }
}
