//! Eval runtime for MCP servers.
//!
//! Drives an LLM agent against an MCP server's tools in a bounded agentic
//! loop, captures a complete execution trace, grades the final answer on
//! five dimensions with a second LLM call, and enforces rubric minimums.
//!
//! # Architecture
//!
//! - `config`: runtime knobs and eval-suite file loading
//! - `eval` / `rubric`: eval definitions and grading rubrics
//! - `trace`: the execution trace data model
//! - `runner`: MCP session lifecycle, agentic loop, batch orchestration
//! - `grader`: grading prompt assembly and score parsing
//! - `extract`: JSON extraction from grading responses

pub mod config;
pub mod error;
pub mod eval;
pub mod extract;
pub mod grader;
pub mod rubric;
pub mod runner;
pub mod trace;

pub use config::{CacheTtl, ClientConfig, ConfigError, EvalConfig, McpServerConfig};
pub use error::EvalError;
pub use eval::Eval;
pub use extract::extract_json;
pub use grader::{build_grading_prompt, GRADING_SYSTEM_PROMPT};
pub use rubric::{DimensionCriteria, GradingRubric, MinimumScoreError, RubricError, ScoreFailure};
pub use runner::{EvalClient, AGENT_SYSTEM_PROMPT};
pub use trace::{
    AgenticStep, EvalResult, EvalRunResult, EvalTrace, GradeResult, GradingTrace, ToolCall,
};
