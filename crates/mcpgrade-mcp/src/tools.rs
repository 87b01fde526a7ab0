//! Tool catalog entries retrieved from an MCP server.

use mcpgrade_llm::ToolDefinition;
use serde_json::Value;

/// One tool advertised by the MCP server.
///
/// The full input schema is preserved; the LLM tool catalog only needs its
/// `properties` sub-map, which [`McpTool::to_tool_definition`] extracts.
#[derive(Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl McpTool {
    /// Convert to the LLM tool-catalog shape.
    pub fn to_tool_definition(&self) -> ToolDefinition {
        let properties = self
            .input_schema
            .get("properties")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
            }),
            cache_control: None,
        }
    }
}

/// Result of a single tool invocation.
#[derive(Debug, Clone)]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    pub is_error: bool,
}

/// Content variants an MCP tool can return.
#[derive(Debug, Clone)]
pub enum McpContent {
    Text(String),
    Image { data: String, mime_type: String },
    Resource { uri: String, text: Option<String> },
}
