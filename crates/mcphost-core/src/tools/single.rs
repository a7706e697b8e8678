//! Router over exactly one backend connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::logging::Logger;
use crate::types::Tool;

use super::backend::ToolBackend;
use super::error::{RouterError, RouterResult};
use super::router::ToolRouter;

/// Routes every call to one fixed backend
pub struct SingleBackendRouter {
    backend: Arc<dyn ToolBackend>,
    catalog: Vec<Tool>,
    closed: AtomicBool,
    logger: Arc<dyn Logger>,
}

impl SingleBackendRouter {
    pub fn new(backend: Arc<dyn ToolBackend>, logger: Arc<dyn Logger>) -> Self {
        let mut catalog = backend.tools();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog.dedup_by(|a, b| a.name == b.name);
        logger.info(&format!(
            "tool router: {} serving {} tools",
            backend.address(),
            catalog.len()
        ));
        Self {
            backend,
            catalog,
            closed: AtomicBool::new(false),
            logger,
        }
    }
}

#[async_trait]
impl ToolRouter for SingleBackendRouter {
    fn catalog(&self) -> Vec<Tool> {
        self.catalog.clone()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> RouterResult<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RouterError::Closed);
        }
        if !self.catalog.iter().any(|t| t.name == name) {
            return Err(RouterError::ToolNotFound(name.to_string()));
        }
        self.backend.call_tool(name, arguments).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.logger
            .info(&format!("tool router: closing {}", self.backend.address()));
        self.backend.close().await;
    }
}
