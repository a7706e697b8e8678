//! MCP (Model Context Protocol) client module
//!
//! Uses the official rmcp SDK to connect to MCP servers over stdio, streamable
//! HTTP or a Unix socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcphost_core::mcp::{McpClient, McpTimeouts};
//!
//! let client = McpClient::connect_http("http://127.0.0.1:8080/mcp", McpTimeouts::default(), logger).await?;
//! for tool in client.tools() {
//!     println!("{}", tool.name);
//! }
//! let text = client.call_tool("time_now", json!({})).await?;
//! client.close().await;
//! ```

mod client;
mod transport;

pub use client::{
    result_text, McpClient, McpError, McpResult, McpTimeouts, DEFAULT_CALL_TIMEOUT,
    DEFAULT_INIT_TIMEOUT,
};
pub use transport::TransportKind;
