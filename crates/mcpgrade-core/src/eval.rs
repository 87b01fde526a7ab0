//! Eval test-case definitions.

use serde::{Deserialize, Serialize};

use crate::rubric::GradingRubric;

/// A single evaluation test case. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eval {
    /// Unique identifier within the batch
    pub name: String,
    /// Human-readable description of what this eval tests
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// The input prompt to send to the LLM
    pub prompt: String,
    /// Expected behavior or result (documentation and grading context)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expected_result: String,
    /// Custom system prompt for the agent; overrides the client-level default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_system_prompt: String,
    /// Custom grading criteria for this eval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_rubric: Option<GradingRubric>,
}
