//! MCP session over a child process's stdio.
//!
//! Spawns the server, performs the MCP initialize handshake, lists tools, and
//! dispatches tool calls. The session exclusively owns the child process and
//! its pipes; dropping the session (or calling [`McpSession::close`])
//! terminates the child.

use std::sync::Arc;

use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, Content, Implementation,
    InitializeRequestParam, RawContent,
};
use rmcp::service::{self, RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::tools::{McpContent, McpTool, McpToolResult};

/// Per-line callback for the server's stderr. Lines are delivered from a
/// single pump task, so the callback only needs to be `Send + Sync`.
pub type StderrSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors from the MCP session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server binary could not be started
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),

    /// MCP initialize or tools/list failed
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    /// A single tool call failed at the transport layer
    #[error("tool call failed: {0}")]
    Call(String),
}

#[derive(Clone)]
struct SessionHandler;

impl ClientHandler for SessionHandler {
    fn get_info(&self) -> InitializeRequestParam {
        InitializeRequestParam {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "mcpgrade".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
        }
    }
}

/// A live connection to one MCP server.
pub struct McpSession {
    service: Option<RunningService<RoleClient, SessionHandler>>,
    tools: Vec<McpTool>,
}

impl McpSession {
    /// Spawn the server, handshake, and list its tools.
    ///
    /// The child always inherits the parent environment; `extra_env` entries
    /// (`KEY=VALUE`) are layered on top, later entries winning. This keeps
    /// `PATH` and friends available to servers launched through interpreters.
    ///
    /// With a `stderr_sink`, the child's stderr is piped and pumped to the
    /// sink line by line on a background task that exits at EOF; otherwise
    /// stderr is forwarded to the parent's stderr.
    pub async fn open(
        command: &str,
        args: &[String],
        extra_env: &[String],
        stderr_sink: Option<StderrSink>,
    ) -> Result<Self, SessionError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (key, value) in parse_env_entries(extra_env) {
            cmd.env(key, value);
        }

        let stderr_mode = if stderr_sink.is_some() {
            std::process::Stdio::piped()
        } else {
            std::process::Stdio::inherit()
        };

        let (transport, stderr) = TokioChildProcess::builder(cmd)
            .stderr(stderr_mode)
            .spawn()
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        if let (Some(stderr), Some(sink)) = (stderr, stderr_sink) {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                // Read errors are silenced; they normally mean the server exited.
                while let Ok(Some(line)) = lines.next_line().await {
                    sink(&line);
                }
            });
        }

        let service = service::serve_client(SessionHandler, transport)
            .await
            .map_err(|e| SessionError::Handshake(format!("initialize failed: {e}")))?;

        let listed = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = service.cancel().await;
                return Err(SessionError::Handshake(format!("tools/list failed: {e}")));
            }
        };

        let tools = listed
            .into_iter()
            .map(|tool| McpTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: serde_json::to_value(tool.input_schema)
                    .unwrap_or_else(|_| serde_json::json!({})),
            })
            .collect();

        Ok(Self {
            service: Some(service),
            tools,
        })
    }

    /// Tools advertised by the server at handshake time.
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Invoke a server-side tool. `arguments` is arbitrary JSON; non-object
    /// values are sent as an empty argument map.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolResult, SessionError> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| SessionError::Call("session is closed".to_string()))?;

        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments.as_object().cloned().unwrap_or_default()),
        };

        let result = service
            .call_tool(params)
            .await
            .map_err(|e| SessionError::Call(e.to_string()))?;

        Ok(convert_call_tool_result(result))
    }

    /// Terminate the child and release its pipes. Idempotent.
    pub async fn close(&mut self) {
        if let Some(service) = self.service.take() {
            if let Err(e) = service.cancel().await {
                tracing::debug!("error while closing MCP session: {e}");
            }
        }
    }
}

/// Split `KEY=VALUE` entries for the child environment. Entries without a
/// `=` are skipped; later entries override earlier ones when applied in
/// order, matching shell semantics.
pub fn parse_env_entries(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
        })
        .collect()
}

fn convert_call_tool_result(result: CallToolResult) -> McpToolResult {
    let content = result
        .content
        .into_iter()
        .filter_map(convert_content)
        .collect();

    McpToolResult {
        content,
        is_error: result.is_error.unwrap_or(false),
    }
}

fn convert_content(content: Content) -> Option<McpContent> {
    match content.raw {
        RawContent::Text(text_content) => Some(McpContent::Text(text_content.text)),
        RawContent::Image(image_content) => Some(McpContent::Image {
            data: image_content.data,
            mime_type: image_content.mime_type,
        }),
        RawContent::Resource(resource) => {
            let (uri, text) = match resource.resource {
                rmcp::model::ResourceContents::TextResourceContents { uri, text, .. } => {
                    (uri, Some(text))
                }
                rmcp::model::ResourceContents::BlobResourceContents { uri, .. } => (uri, None),
            };
            Some(McpContent::Resource { uri, text })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_entries() {
        let entries = vec![
            "TEST_API_TOKEN=test-secret-token-12345".to_string(),
            "EMPTY=".to_string(),
            "MALFORMED".to_string(),
            "WITH=equals=inside".to_string(),
        ];
        let parsed = parse_env_entries(&entries);
        assert_eq!(
            parsed,
            vec![
                (
                    "TEST_API_TOKEN".to_string(),
                    "test-secret-token-12345".to_string()
                ),
                ("EMPTY".to_string(), String::new()),
                ("WITH".to_string(), "equals=inside".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_missing_binary_is_spawn_error() {
        let err = McpSession::open("/nonexistent/mcp-server-binary", &[], &[], None)
            .await
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, SessionError::Spawn(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_open_non_mcp_process_is_handshake_error() {
        // `true` exits immediately without ever speaking MCP.
        let err = McpSession::open("true", &[], &[], None)
            .await
            .err()
            .expect("handshake should fail");
        assert!(matches!(err, SessionError::Handshake(_)), "got {err:?}");
    }
}
