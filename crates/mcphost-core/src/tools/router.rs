//! The capability interface the conversation engine routes tool calls through

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Tool;

use super::error::RouterResult;

/// Exposes a tool catalog and dispatches invocations to whichever backend
/// owns each tool
#[async_trait]
pub trait ToolRouter: Send + Sync {
    /// Current catalog, sorted by name
    fn catalog(&self) -> Vec<Tool>;

    /// Invoke `name` with `arguments` and return its text result
    async fn invoke(&self, name: &str, arguments: Value) -> RouterResult<String>;

    /// Release every backend. Safe to call more than once.
    async fn close(&self);
}
