//! Tool routing errors

use thiserror::Error;

use crate::mcp::McpError;

/// Errors raised while routing a tool invocation
#[derive(Error, Debug)]
pub enum RouterError {
    /// No live backend advertises the tool
    #[error("tool {0:?} not found (no connected MCP server provides it)")]
    ToolNotFound(String),

    /// A backend could not be reached or initialized
    #[error("connect {address}: {message}")]
    Connection { address: String, message: String },

    /// The backend reported a failure for the call
    #[error("call tool {tool}: {message}")]
    Invocation { tool: String, message: String },

    /// The call did not finish within the backend's deadline
    #[error("call tool {tool}: {message}")]
    Timeout { tool: String, message: String },

    /// The router or backend has been closed
    #[error("tool router closed")]
    Closed,
}

impl RouterError {
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn invocation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Classify an MCP client failure of a call to `tool`
    pub fn from_call(tool: &str, err: McpError) -> Self {
        match err {
            McpError::Timeout(message) => Self::Timeout {
                tool: tool.to_string(),
                message,
            },
            McpError::Closed => Self::Closed,
            other => Self::invocation(tool, other.to_string()),
        }
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
