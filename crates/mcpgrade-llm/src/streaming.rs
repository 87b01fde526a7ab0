//! Streaming response handling for the Messages API.
//!
//! `MessageStream` turns the raw SSE byte stream into parsed [`StreamEvent`]s.
//! `MessageAccumulator` folds those events into the final assistant message,
//! joining text deltas and assembling tool_use inputs from their JSON deltas,
//! and exposes the final usage and stop reason.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::error::AnthropicError;
use crate::types::{ContentBlock, ContentDelta, StopReason, StreamEvent, Usage};

/// A streaming response from the Messages API.
pub struct MessageStream {
    /// The underlying byte stream
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    /// Buffer for incomplete SSE data
    buffer: String,
    /// Whether the stream has completed
    done: bool,
}

impl MessageStream {
    /// Create a new streaming response from a reqwest response.
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            inner: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            done: false,
        }
    }

    /// Parse one SSE block into a stream event.
    ///
    /// SSE format is:
    /// ```text
    /// event: content_block_delta
    /// data: {"type":"content_block_delta",...}
    /// ```
    ///
    /// Only `data: ` at the START of a line is matched, so streamed text that
    /// itself contains "data: " cannot confuse the parser.
    pub(crate) fn parse_sse_block(block: &str) -> Option<Result<StreamEvent, AnthropicError>> {
        let block = block.trim();

        if block.is_empty() || block.starts_with(':') {
            return None;
        }

        // Take the last data: line in case there are multiple.
        let mut data_content: Option<&str> = None;
        for line in block.split('\n') {
            if let Some(content) = line.trim().strip_prefix("data: ") {
                data_content = Some(content);
            }
        }

        let data_content = data_content?.trim();

        if data_content == "[DONE]" {
            return None;
        }

        match serde_json::from_str::<StreamEvent>(data_content) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(
                    "failed to parse stream event: {} - data: {}",
                    e,
                    &data_content[..data_content.len().min(200)]
                );
                Some(Err(AnthropicError::Parse(format!(
                    "failed to parse stream event: {e}"
                ))))
            }
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<StreamEvent, AnthropicError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            // Emit any complete SSE block already buffered.
            if let Some(pos) = self.buffer.find("\n\n") {
                let block = self.buffer[..pos].to_string();
                self.buffer.drain(..pos + 2);

                match Self::parse_sse_block(&block) {
                    Some(Ok(event)) => {
                        if matches!(event, StreamEvent::MessageStop) {
                            self.done = true;
                        }
                        return Poll::Ready(Some(Ok(event)));
                    }
                    Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                    None => continue,
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => self.buffer.push_str(text),
                        Err(_) => {
                            tracing::warn!("received {} bytes of invalid UTF-8", bytes.len());
                        }
                    }
                    // Loop back to process the extended buffer.
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(AnthropicError::Stream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    // Process any trailing block that was not newline-terminated.
                    if !self.buffer.is_empty() {
                        let block = std::mem::take(&mut self.buffer);
                        if let Some(result) = Self::parse_sse_block(&block) {
                            return Poll::Ready(Some(result));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// The fully accumulated result of one streamed message.
#[derive(Debug, Clone)]
pub struct StreamedMessage {
    /// Final assistant content blocks, in arrival order
    pub content: Vec<ContentBlock>,
    /// Stop reason from the final message_delta (None if the stream ended
    /// without one)
    pub stop_reason: Option<StopReason>,
    /// Merged usage from message_start and message_delta
    pub usage: Usage,
    /// Every text delta observed, concatenated in arrival order
    pub text: String,
}

impl StreamedMessage {
    /// Concatenated text of the final text blocks.
    pub fn block_text(&self) -> String {
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

/// In-progress content block during accumulation.
enum BlockBuilder {
    Text { text: String },
    ToolUse { id: String, name: String, json: String },
}

/// Folds [`StreamEvent`]s into a [`StreamedMessage`].
///
/// Single-writer in-memory buffer; one accumulator per stream.
#[derive(Default)]
pub struct MessageAccumulator {
    blocks: Vec<BlockBuilder>,
    text: String,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulator.
    pub fn push(&mut self, event: StreamEvent) -> Result<(), AnthropicError> {
        match event {
            StreamEvent::MessageStart { message } => {
                // input tokens and cache metrics arrive here
                self.usage = message.usage;
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let builder = match content_block {
                    ContentBlock::Text { text } => BlockBuilder::Text { text },
                    ContentBlock::ToolUse { id, name, .. } => BlockBuilder::ToolUse {
                        id,
                        name,
                        json: String::new(),
                    },
                    ContentBlock::ToolResult { .. } => {
                        return Err(AnthropicError::Stream(
                            "unexpected tool_result block in model output".to_string(),
                        ));
                    }
                };
                if index != self.blocks.len() {
                    tracing::warn!(
                        "content block index {} does not match position {}",
                        index,
                        self.blocks.len()
                    );
                }
                self.blocks.push(builder);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                let Some(builder) = self.blocks.get_mut(index) else {
                    return Err(AnthropicError::Stream(format!(
                        "delta for unknown content block {index}"
                    )));
                };
                match (builder, delta) {
                    (BlockBuilder::Text { text }, ContentDelta::TextDelta { text: delta }) => {
                        text.push_str(&delta);
                        self.text.push_str(&delta);
                    }
                    (
                        BlockBuilder::ToolUse { json, .. },
                        ContentDelta::InputJsonDelta { partial_json },
                    ) => {
                        json.push_str(&partial_json);
                    }
                    _ => {
                        return Err(AnthropicError::Stream(
                            "content delta type does not match its block".to_string(),
                        ));
                    }
                }
            }
            StreamEvent::ContentBlockStop { .. } => {}
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason;
                self.usage.merge_delta(&usage);
            }
            StreamEvent::MessageStop | StreamEvent::Ping => {}
            StreamEvent::Error { error } => {
                return Err(AnthropicError::Stream(format!(
                    "{}: {}",
                    error.error_type, error.message
                )));
            }
        }
        Ok(())
    }

    /// Finish accumulation, producing the final message.
    pub fn finish(self) -> Result<StreamedMessage, AnthropicError> {
        let mut content = Vec::with_capacity(self.blocks.len());
        for builder in self.blocks {
            match builder {
                BlockBuilder::Text { text } => content.push(ContentBlock::Text { text }),
                BlockBuilder::ToolUse { id, name, json } => {
                    let input = if json.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&json).map_err(|e| {
                            AnthropicError::Parse(format!(
                                "invalid tool input JSON for '{name}': {e}"
                            ))
                        })?
                    };
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
            }
        }
        Ok(StreamedMessage {
            content,
            stop_reason: self.stop_reason,
            usage: self.usage,
            text: self.text,
        })
    }
}
