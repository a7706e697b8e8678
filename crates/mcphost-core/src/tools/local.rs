//! In-process tool backends
//!
//! `LocalBackend` serves tools from plain closures and `LocalConnector` hands
//! them out by address. They stand in for MCP servers in tests and embedded
//! setups without a network hop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::types::Tool;

use super::backend::{BackendConnector, ToolBackend};
use super::error::{RouterError, RouterResult};

type Handler = Arc<dyn Fn(Value) -> Result<String, String> + Send + Sync>;

/// Backend whose tools are closures
pub struct LocalBackend {
    address: String,
    tools: Vec<Tool>,
    handlers: HashMap<String, Handler>,
    call_delay: Option<Duration>,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl LocalBackend {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tools: Vec::new(),
            handlers: HashMap::new(),
            call_delay: None,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Serve `tool` with `handler`; an `Err` becomes an invocation failure
    pub fn with_tool<F>(mut self, tool: Tool, handler: F) -> Self
    where
        F: Fn(Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.handlers.insert(tool.name.clone(), Arc::new(handler));
        self.tools.push(tool);
        self
    }

    /// Serve a tool that always answers `reply`
    pub fn with_fixed(self, name: &str, reply: &str) -> Self {
        let reply = reply.to_string();
        self.with_tool(Tool::new(name, format!("{name} tool")), move |_| Ok(reply.clone()))
    }

    /// Sleep this long before answering each call
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Times `close` was invoked
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBackend for LocalBackend {
    fn address(&self) -> &str {
        &self.address
    }

    fn tools(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    // Stays callable after close so in-flight routing can finish.
    async fn call_tool(&self, name: &str, arguments: Value) -> RouterResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| RouterError::ToolNotFound(name.to_string()))?;
        handler(arguments).map_err(|message| RouterError::invocation(name, message))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector resolving addresses to registered local backends
#[derive(Default)]
pub struct LocalConnector {
    backends: RwLock<HashMap<String, Arc<LocalBackend>>>,
    attempts: AtomicUsize,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `backend` reachable at its address
    pub fn register(&self, backend: Arc<LocalBackend>) {
        self.backends
            .write()
            .insert(backend.address.clone(), backend);
    }

    /// Make `address` unreachable for future connects
    pub fn unregister(&self, address: &str) {
        self.backends.write().remove(address);
    }

    /// Connect attempts so far, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for LocalConnector {
    async fn connect(&self, address: &str) -> RouterResult<Arc<dyn ToolBackend>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let backend = self.backends.read().get(address).cloned();
        match backend {
            Some(backend) => Ok(backend),
            None => Err(RouterError::connection(address, "connection refused")),
        }
    }
}
