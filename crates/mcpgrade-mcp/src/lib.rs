//! MCP client session for the eval runtime.
//!
//! One [`McpSession`] per eval run: spawn the server as a child process,
//! perform the JSON-RPC handshake over stdio, list tools, dispatch tool
//! calls, and tear the child down on close or drop.

pub mod session;
pub mod tools;

pub use session::{parse_env_entries, McpSession, SessionError, StderrSink};
pub use tools::{McpContent, McpTool, McpToolResult};
