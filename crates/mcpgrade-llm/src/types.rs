//! Request and response types for the Anthropic Messages API.

use serde::{Deserialize, Serialize};

/// API version sent in the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag enabling the extended (1M token) context window.
pub const CONTEXT_1M_BETA: &str = "context-1m-2025-08-07";

/// Maximum tokens default.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Cache control configuration for prompt caching.
/// When set, marks the preceding request prefix as cacheable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControl {
    /// The cache type. Currently only "ephemeral" is supported.
    #[serde(rename = "type")]
    pub cache_type: String,
    /// Optional time-to-live. The API accepts "5m" (default) or "1h";
    /// omitting the field selects the 5-minute TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl CacheControl {
    /// Create an ephemeral cache control marker with the default 5-minute TTL.
    pub fn ephemeral() -> Self {
        Self {
            cache_type: "ephemeral".to_string(),
            ttl: None,
        }
    }

    /// Attach an explicit TTL ("1h" for the premium one-hour cache).
    pub fn with_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }
}

/// A block in the system prompt array.
/// The array form is required for prompt caching - the single-string format
/// does not support cache_control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBlock {
    /// Block type (always "text" for system prompts)
    #[serde(rename = "type")]
    pub block_type: String,
    /// The text content
    pub text: String,
    /// Optional cache control marker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemBlock {
    /// Create a new text system block without caching.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: content.into(),
            cache_control: None,
        }
    }

    /// Create a new text system block with the given cache marker.
    pub fn cached(content: impl Into<String>, cache_control: Option<CacheControl>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: content.into(),
            cache_control,
        }
    }
}

/// Content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },
    /// Tool use request from the model
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Tool result fed back after execution
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message from already-assembled content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Create a user message carrying tool results.
    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

/// Tool definition for the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    /// Optional cache control marker for caching tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Request body for the Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt as array of blocks (required for caching).
    /// If None, no system prompt is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Tools available to the model (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Usage statistics in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens (may be missing in message_delta events)
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens used to create new cache entries
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Tokens read from cache (cache hit)
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Merge the final `message_delta` usage into the `message_start` usage.
    /// The API reports input tokens and cache metrics in message_start and
    /// only output tokens in message_delta; newer servers repeat the input
    /// metrics in the delta, in which case the delta wins.
    pub fn merge_delta(&mut self, delta: &Usage) {
        if delta.input_tokens > 0 {
            self.input_tokens = delta.input_tokens;
        }
        self.output_tokens = delta.output_tokens;
        if delta.cache_creation_input_tokens > 0 {
            self.cache_creation_input_tokens = delta.cache_creation_input_tokens;
        }
        if delta.cache_read_input_tokens > 0 {
            self.cache_read_input_tokens = delta.cache_read_input_tokens;
        }
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    /// Forward compatibility for stop reasons this client does not know about
    #[serde(other)]
    Other,
}

impl StopReason {
    /// Wire-format name, used when recording the stop reason in traces.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
            StopReason::ToolUse => "tool_use",
            StopReason::Other => "other",
        }
    }
}

/// Response from the non-streaming Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    /// Unique ID for the response
    pub id: String,
    /// Type of response (always "message")
    #[serde(rename = "type")]
    pub response_type: String,
    /// Role (always "assistant")
    pub role: String,
    /// Content blocks
    pub content: Vec<ContentBlock>,
    /// Model that generated the response
    pub model: String,
    /// Reason the model stopped generating
    pub stop_reason: Option<StopReason>,
    /// Stop sequence that triggered stopping (if applicable)
    pub stop_sequence: Option<String>,
    /// Token usage statistics
    pub usage: Usage,
}

impl MessagesResponse {
    /// Extract the concatenated text content from the response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Streaming event types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Initial message start event
    MessageStart { message: StreamMessageStart },
    /// Content block started
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    /// Delta for content block
    ContentBlockDelta { index: usize, delta: ContentDelta },
    /// Content block finished
    ContentBlockStop { index: usize },
    /// Final message delta with stop reason and usage
    MessageDelta {
        delta: MessageDeltaContent,
        usage: Usage,
    },
    /// Message complete
    MessageStop,
    /// Ping event (keep-alive)
    Ping,
    /// Error event
    Error { error: StreamError },
}

/// Message start in streaming.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessageStart {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    pub model: String,
    pub usage: Usage,
}

/// Content delta in streaming.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// Message delta content.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaContent {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}

/// Error in streaming.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
