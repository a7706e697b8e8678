//! MCP Client using the official rmcp SDK
//!
//! Connects to MCP servers over stdio (child process), streamable HTTP or a
//! Unix socket. A client is ready only after the initialize handshake and a
//! tool listing have both completed within the setup timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rmcp::{
    ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
        RawContent,
    },
    service::RunningService,
    RoleClient,
};
use serde_json::Value;
use thiserror::Error;

use crate::logging::Logger;
use crate::types::Tool;

/// Default time allowed for handshake plus tool listing
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for one tool call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// MCP client errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection closed")]
    Closed,

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type McpResult<T> = Result<T, McpError>;

/// Setup and call deadlines for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McpTimeouts {
    pub init: Duration,
    pub call: Duration,
}

impl Default for McpTimeouts {
    fn default() -> Self {
        Self {
            init: DEFAULT_INIT_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

type Session = RunningService<RoleClient, ClientInfo>;

/// One live connection to an MCP server
pub struct McpClient {
    /// Endpoint this client was dialed at (URL, socket path or command line)
    address: String,
    /// Tools advertised during setup
    tools: Vec<Tool>,
    /// `None` once closed; in-flight calls hold their own reference
    session: RwLock<Option<Arc<Session>>>,
    call_timeout: Duration,
    logger: Arc<dyn Logger>,
}

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "mcphost".to_string(),
            title: Some("mcphost".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            website_url: None,
            icons: None,
        },
    }
}

impl McpClient {
    /// Connect to an MCP server over HTTP (Streamable HTTP transport)
    pub async fn connect_http(
        url: &str,
        timeouts: McpTimeouts,
        logger: Arc<dyn Logger>,
    ) -> McpResult<Self> {
        use rmcp::transport::StreamableHttpClientTransport;

        logger.info(&format!("[McpClient] Connecting to HTTP: {}", url));

        Self::within_setup(timeouts.init, url, async {
            let transport = StreamableHttpClientTransport::from_uri(url.to_string());
            let session = client_info()
                .serve(transport)
                .await
                .map_err(|e| McpError::InitializationFailed(e.to_string()))?;
            Self::ready(url.to_string(), session, timeouts, Arc::clone(&logger)).await
        })
        .await
    }

    /// Spawn `command` and talk MCP over its stdin/stdout
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        timeouts: McpTimeouts,
        logger: Arc<dyn Logger>,
    ) -> McpResult<Self> {
        use rmcp::transport::TokioChildProcess;
        use tokio::process::Command;

        let address = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        logger.info(&format!("[McpClient] Spawning stdio server: {}", address));

        let mut cmd = Command::new(command);
        cmd.args(args);
        let transport =
            TokioChildProcess::new(cmd).map_err(|e| McpError::ConnectionFailed(e.to_string()))?;

        Self::within_setup(timeouts.init, &address, async {
            let session = client_info()
                .serve(transport)
                .await
                .map_err(|e| McpError::InitializationFailed(e.to_string()))?;
            Self::ready(address.clone(), session, timeouts, Arc::clone(&logger)).await
        })
        .await
    }

    /// Connect to an MCP server over a Unix socket
    #[cfg(unix)]
    pub async fn connect_unix(
        socket_path: &str,
        timeouts: McpTimeouts,
        logger: Arc<dyn Logger>,
    ) -> McpResult<Self> {
        use tokio::net::UnixStream;

        logger.info(&format!("[McpClient] Connecting to Unix socket: {}", socket_path));

        Self::within_setup(timeouts.init, socket_path, async {
            let stream = UnixStream::connect(socket_path)
                .await
                .map_err(|e| McpError::ConnectionFailed(e.to_string()))?;
            let session = client_info()
                .serve(stream)
                .await
                .map_err(|e| McpError::InitializationFailed(e.to_string()))?;
            Self::ready(socket_path.to_string(), session, timeouts, Arc::clone(&logger)).await
        })
        .await
    }

    async fn within_setup<F>(limit: Duration, address: &str, setup: F) -> McpResult<Self>
    where
        F: Future<Output = McpResult<Self>>,
    {
        tokio::time::timeout(limit, setup).await.map_err(|_| {
            McpError::Timeout(format!("setup of {} exceeded {:?}", address, limit))
        })?
    }

    /// List tools on a freshly initialized session and wrap it
    async fn ready(
        address: String,
        session: Session,
        timeouts: McpTimeouts,
        logger: Arc<dyn Logger>,
    ) -> McpResult<Self> {
        let listed = session
            .list_all_tools()
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        let tools: Vec<Tool> = listed
            .into_iter()
            .map(|t| {
                Tool::new(t.name.to_string(), t.description.as_deref().unwrap_or_default())
                    .with_schema(Value::Object((*t.input_schema).clone()))
            })
            .collect();

        logger.info(&format!(
            "[McpClient] {} ready with {} tools",
            address,
            tools.len()
        ));

        Ok(Self {
            address,
            tools,
            session: RwLock::new(Some(Arc::new(session))),
            call_timeout: timeouts.call,
            logger,
        })
    }

    /// Endpoint this client was dialed at
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Tools advertised by the server at setup
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.session.read().is_none()
    }

    /// Call a tool by name and flatten the result to text
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<String> {
        let arguments = call_arguments(name, arguments)?;
        let session = self.session.read().clone().ok_or(McpError::Closed)?;
        self.logger.debug(&format!("[McpClient] Calling tool: {}", name));

        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        };

        let result = tokio::time::timeout(self.call_timeout, session.call_tool(params))
            .await
            .map_err(|_| {
                McpError::Timeout(format!("tool {} exceeded {:?}", name, self.call_timeout))
            })?
            .map_err(|e| McpError::ToolCallFailed(e.to_string()))?;

        Ok(result_text(&result))
    }

    /// Release the session. Returns `true` only for the call that closed it.
    ///
    /// Calls already in flight keep the session alive until they finish.
    pub async fn close(&self) -> bool {
        let taken = self.session.write().take();
        let Some(session) = taken else {
            return false;
        };

        self.logger.info(&format!("[McpClient] Closing {}", self.address));
        match Arc::try_unwrap(session) {
            Ok(session) => {
                if let Err(e) = session.cancel().await {
                    self.logger
                        .warn(&format!("[McpClient] Close of {} failed: {}", self.address, e));
                }
            }
            // The last in-flight call drops it, which cancels the service
            Err(shared) => drop(shared),
        }
        true
    }
}

/// MCP tool arguments are a JSON object; `null` means none
fn call_arguments(
    name: &str,
    arguments: Value,
) -> McpResult<Option<serde_json::Map<String, Value>>> {
    match arguments {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(McpError::ToolCallFailed(format!(
            "tool {}: arguments must be a JSON object, got {}",
            name, other
        ))),
    }
}

/// Flatten a tool result into the text handed back to the model
///
/// Text parts are each followed by a newline. Without text, structured
/// content is rendered as JSON; without either, `(no content)`.
pub fn result_text(result: &CallToolResult) -> String {
    let text: String = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(format!("{}\n", t.text)),
            _ => None,
        })
        .collect();

    if !text.is_empty() {
        return text;
    }
    match &result.structured_content {
        Some(value) => value.to_string(),
        None => "(no content)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use rmcp::model::Content;
    use serde_json::json;

    #[test]
    fn test_result_text_joins_text_parts() {
        let result = CallToolResult::success(vec![Content::text("a"), Content::text("b")]);
        assert_eq!(result_text(&result), "a\nb\n");
    }

    #[test]
    fn test_result_text_falls_back_to_structured() {
        let mut result = CallToolResult::success(vec![]);
        result.structured_content = Some(json!({ "now": "2024-01-01T00:00:00Z" }));
        assert_eq!(result_text(&result), r#"{"now":"2024-01-01T00:00:00Z"}"#);
    }

    #[test]
    fn test_result_text_empty() {
        let result = CallToolResult::success(vec![]);
        assert_eq!(result_text(&result), "(no content)");
    }

    #[test]
    fn test_call_arguments_must_be_an_object() {
        assert_eq!(call_arguments("t", Value::Null).unwrap(), None);
        assert_eq!(
            call_arguments("t", json!({"city": "Oslo"})).unwrap().unwrap()["city"],
            "Oslo"
        );

        for bad in [json!([1, 2]), json!("[1,2]"), json!(7)] {
            match call_arguments("t", bad) {
                Err(McpError::ToolCallFailed(message)) => {
                    assert!(message.contains("must be a JSON object"))
                }
                other => panic!("expected ToolCallFailed, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_default_timeouts() {
        let t = McpTimeouts::default();
        assert_eq!(t.init, Duration::from_secs(5));
        assert_eq!(t.call, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_http_connect_failure_is_reported() {
        // Port 9 (discard) is closed on test hosts; the handshake must fail or time out
        let timeouts = McpTimeouts {
            init: Duration::from_millis(500),
            call: DEFAULT_CALL_TIMEOUT,
        };
        let result =
            McpClient::connect_http("http://127.0.0.1:9/mcp", timeouts, Arc::new(NoOpLogger::new()))
                .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let result = McpClient::connect_unix(
            path.to_str().unwrap(),
            McpTimeouts::default(),
            Arc::new(NoOpLogger::new()),
        )
        .await;
        assert!(matches!(result, Err(McpError::ConnectionFailed(_))));
    }
}
