//! Error types for the Anthropic Messages client.

use thiserror::Error;

/// Errors that can occur when talking to the Messages API.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response body or stream event
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Streaming failed mid-response
    #[error("streaming error: {0}")]
    Stream(String),
}

impl From<serde_json::Error> for AnthropicError {
    fn from(err: serde_json::Error) -> Self {
        AnthropicError::Parse(err.to_string())
    }
}
