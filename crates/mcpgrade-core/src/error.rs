//! Error kinds for the eval runtime.

use thiserror::Error;

use crate::rubric::MinimumScoreError;
use mcpgrade_mcp::SessionError;

/// Fatal and result-level errors for a single eval run.
///
/// Tool-level failures are deliberately absent: they are captured inside the
/// step's `ToolCall` record and fed back to the model, which is the recovery
/// mechanism.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The MCP server binary could not be started
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),

    /// MCP initialize or tools/list failed
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    /// LLM streaming failed mid-turn
    #[error("streaming error: {0}")]
    Stream(String),

    /// Grading request or response parsing failed; the eval result itself is
    /// preserved
    #[error("grading failed: {0}")]
    Grading(String),

    /// Scores fell below the rubric's thresholds; the grade is preserved
    #[error(transparent)]
    MinimumScore(#[from] MinimumScoreError),

    /// Deadline reached or the run was cancelled
    #[error("evaluation cancelled: {0}")]
    Cancelled(String),
}

impl From<SessionError> for EvalError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Spawn(message) => EvalError::Spawn(message),
            SessionError::Handshake(message) => EvalError::Handshake(message),
            // Transport failures during a call are recorded on the ToolCall;
            // one escaping here means the session itself is gone.
            SessionError::Call(message) => EvalError::Handshake(message),
        }
    }
}
