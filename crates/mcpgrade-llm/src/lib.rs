//! Anthropic Messages API client used by the eval runtime.
//!
//! Two modes of operation:
//! - [`Client::stream_message`] streams a completion and accumulates the
//!   incremental events into the final assistant message (text deltas joined,
//!   tool_use inputs assembled), exposing the final usage and stop reason.
//! - [`Client::complete`] performs a single non-streaming completion, used
//!   for grading.
//!
//! Request assembly (system blocks, tool catalog, cache-control markers) is
//! done by the caller; this crate only defines the wire types.

pub mod client;
pub mod error;
pub mod streaming;
pub mod types;

pub use client::{Client, DEFAULT_BASE_URL};
pub use error::AnthropicError;
pub use streaming::{MessageAccumulator, MessageStream, StreamedMessage};
pub use types::{
    CacheControl, ContentBlock, Message, MessagesRequest, MessagesResponse, Role, StopReason,
    SystemBlock, ToolDefinition, Usage, ANTHROPIC_VERSION, CONTEXT_1M_BETA, DEFAULT_MAX_TOKENS,
};
