//! Backend connections the routers dispatch to
//!
//! A [`ToolBackend`] is one live connection exposing the tools it advertised
//! at setup. A [`BackendConnector`] dials a discovered address into one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::logging::Logger;
use crate::mcp::{McpClient, McpTimeouts, TransportKind};
use crate::types::Tool;

use super::error::{RouterError, RouterResult};

/// One live connection to a tool-execution endpoint
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Address the connection was made to
    fn address(&self) -> &str;

    /// Tools advertised when the connection was set up
    fn tools(&self) -> Vec<Tool>;

    /// Invoke `name`; the backend enforces its own call deadline
    async fn call_tool(&self, name: &str, arguments: Value) -> RouterResult<String>;

    /// Release the connection. Repeated calls are no-ops.
    async fn close(&self);
}

/// Dials discovered addresses into live backends
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, address: &str) -> RouterResult<Arc<dyn ToolBackend>>;
}

#[async_trait]
impl ToolBackend for McpClient {
    fn address(&self) -> &str {
        McpClient::address(self)
    }

    fn tools(&self) -> Vec<Tool> {
        McpClient::tools(self).to_vec()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> RouterResult<String> {
        McpClient::call_tool(self, name, arguments)
            .await
            .map_err(|e| RouterError::from_call(name, e))
    }

    async fn close(&self) {
        McpClient::close(self).await;
    }
}

/// Connects to discovered MCP servers
///
/// HTTP addresses are `host:port` and expand to `{scheme}://{address}{path}`;
/// Unix addresses are socket paths.
pub struct McpConnector {
    transport: TransportKind,
    scheme: String,
    path: String,
    timeouts: McpTimeouts,
    logger: Arc<dyn Logger>,
}

impl McpConnector {
    pub fn new(transport: TransportKind, timeouts: McpTimeouts, logger: Arc<dyn Logger>) -> Self {
        Self {
            transport,
            scheme: "http".to_string(),
            path: "/mcp".to_string(),
            timeouts,
            logger,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Endpoint path appended to HTTP addresses
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// URL dialed for an HTTP `address`
    pub fn endpoint_url(&self, address: &str) -> String {
        format!("{}://{}{}", self.scheme, address, self.path)
    }
}

#[async_trait]
impl BackendConnector for McpConnector {
    async fn connect(&self, address: &str) -> RouterResult<Arc<dyn ToolBackend>> {
        let logger = Arc::clone(&self.logger);
        let client = match self.transport {
            TransportKind::Http => {
                McpClient::connect_http(&self.endpoint_url(address), self.timeouts, logger).await
            }
            #[cfg(unix)]
            TransportKind::Unix => McpClient::connect_unix(address, self.timeouts, logger).await,
            #[cfg(not(unix))]
            TransportKind::Unix => {
                return Err(RouterError::connection(address, "unix sockets are unavailable"))
            }
            TransportKind::Stdio => {
                return Err(RouterError::connection(
                    address,
                    "stdio backends cannot be discovered",
                ))
            }
        };

        let client = client.map_err(|e| RouterError::connection(address, e.to_string()))?;
        Ok(Arc::new(client))
    }
}
