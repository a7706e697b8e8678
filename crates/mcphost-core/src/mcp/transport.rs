//! Transport selection for MCP connections

use std::fmt;
use std::str::FromStr;

use super::client::McpError;

/// How a connection reaches its MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Child process speaking over stdin/stdout
    Stdio,
    /// Streamable HTTP (`sse` is accepted as an alias)
    Http,
    /// Unix domain socket
    Unix,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Unix => "unix",
        }
    }

    /// Whether a discovered `host:port` or path can be dialed with this transport
    pub fn is_addressable(&self) -> bool {
        !matches!(self, TransportKind::Stdio)
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" | "" => Ok(TransportKind::Stdio),
            "http" | "sse" => Ok(TransportKind::Http),
            "unix" => Ok(TransportKind::Unix),
            other => Err(McpError::UnsupportedTransport(other.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
