//! HTTP client for the Anthropic Messages API.

use crate::error::AnthropicError;
use crate::streaming::{MessageAccumulator, MessageStream, StreamedMessage};
use crate::types::{MessagesRequest, MessagesResponse, ANTHROPIC_VERSION, CONTEXT_1M_BETA};

use futures::StreamExt;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Client for the Messages API.
///
/// Cheap to clone; the underlying connection pool is shared and safe for
/// concurrent independent requests.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Client {
    /// Create a new client. `base_url` overrides the default API endpoint
    /// when set (for proxies and compatible gateways).
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn post(&self, request: &MessagesRequest) -> reqwest::RequestBuilder {
        self.http
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", CONTEXT_1M_BETA)
            .json(request)
    }

    /// Send a non-streaming completion request. Used for grading.
    pub async fn complete(
        &self,
        request: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let response = self.post(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnthropicError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        Ok(parsed)
    }

    /// Open a streaming completion request and return the raw event stream.
    pub async fn stream(&self, request: &MessagesRequest) -> Result<MessageStream, AnthropicError> {
        let streaming_request = MessagesRequest {
            stream: Some(true),
            ..request.clone()
        };

        let response = self.post(&streaming_request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("streaming request failed ({}): {}", status, body);
            return Err(AnthropicError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(MessageStream::new(response))
    }

    /// Stream a completion and accumulate it into the final message.
    pub async fn stream_message(
        &self,
        request: &MessagesRequest,
    ) -> Result<StreamedMessage, AnthropicError> {
        let mut stream = self.stream(request).await?;
        let mut accumulator = MessageAccumulator::new();
        while let Some(event) = stream.next().await {
            accumulator.push(event?)?;
        }
        accumulator.finish()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
