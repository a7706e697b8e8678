//! Caller-owned wiring of provider, router and engine
//!
//! ```rust,ignore
//! let config = HostConfig::load(HostConfig::user_path())?;
//! let host = HostContext::from_config(config, logger).await?;
//! let reply = host.engine().chat("conv-1", "what time is it?").await?;
//! host.shutdown().await;
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, HostConfig, RegistryProvider};
use crate::discovery::{ConsulResolver, DiscoveryError, DiscoveryResolver, StaticResolver};
use crate::engine::{ConversationEngine, MemoryConversationStore};
use crate::logging::Logger;
use crate::mcp::{McpClient, McpError, TransportKind};
use crate::providers::{create_provider, ModelProvider, ProviderError};
use crate::tools::{AggregatedRouter, McpConnector, SingleBackendRouter, ToolRouter};

/// Startup failures
#[derive(Error, Debug)]
pub enum HostError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("mcp backend: {0}")]
    Connection(#[from] McpError),

    #[error("discovery: {0}")]
    Discovery(#[from] DiscoveryError),
}

pub type HostResult<T> = Result<T, HostError>;

/// Everything a host process needs to serve conversations
pub struct HostContext {
    config: HostConfig,
    provider: Arc<dyn ModelProvider>,
    router: Arc<dyn ToolRouter>,
    engine: Arc<ConversationEngine>,
    logger: Arc<dyn Logger>,
}

impl HostContext {
    /// Build the provider, connect backends and assemble the engine
    pub async fn from_config(config: HostConfig, logger: Arc<dyn Logger>) -> HostResult<Self> {
        config.validate()?;
        let provider = create_provider(&config.provider, Arc::clone(&logger))?;
        let router = build_router(&config, Arc::clone(&logger)).await?;
        Ok(Self::with_parts(config, provider, router, logger))
    }

    /// Assemble from already-built parts
    pub fn with_parts(
        config: HostConfig,
        provider: Arc<dyn ModelProvider>,
        router: Arc<dyn ToolRouter>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let engine = Arc::new(ConversationEngine::new(
            Arc::clone(&provider),
            Arc::clone(&router),
            Arc::new(MemoryConversationStore::new()),
            config.engine.options(),
            Arc::clone(&logger),
        ));
        Self {
            config,
            provider,
            router,
            engine,
            logger,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn router(&self) -> &Arc<dyn ToolRouter> {
        &self.router
    }

    pub fn engine(&self) -> &Arc<ConversationEngine> {
        &self.engine
    }

    /// Stop discovery and close every backend. Safe to call twice.
    pub async fn shutdown(&self) {
        self.logger.info("host shutting down");
        self.router.close().await;
    }
}

/// Pick and connect the router the config describes
async fn build_router(
    config: &HostConfig,
    logger: Arc<dyn Logger>,
) -> HostResult<Arc<dyn ToolRouter>> {
    let mcp = &config.mcp;
    let transport = mcp.transport_kind()?;
    let timeouts = mcp.timeouts();

    if transport == TransportKind::Stdio {
        if config.registry.provider != RegistryProvider::None {
            logger.warn("registry is ignored for the stdio transport");
        }
        let client = McpClient::connect_stdio(
            &mcp.server_cmd,
            &mcp.server_args,
            timeouts,
            Arc::clone(&logger),
        )
        .await?;
        return Ok(Arc::new(SingleBackendRouter::new(Arc::new(client), logger)));
    }

    let resolver: Arc<dyn DiscoveryResolver> = match config.registry.provider {
        RegistryProvider::None => {
            let client = match transport {
                #[cfg(unix)]
                TransportKind::Unix => {
                    McpClient::connect_unix(&mcp.socket_path, timeouts, Arc::clone(&logger)).await?
                }
                #[cfg(not(unix))]
                TransportKind::Unix => {
                    return Err(HostError::Connection(McpError::UnsupportedTransport(
                        "unix".to_string(),
                    )))
                }
                _ => McpClient::connect_http(&mcp.base_url, timeouts, Arc::clone(&logger)).await?,
            };
            return Ok(Arc::new(SingleBackendRouter::new(Arc::new(client), logger)));
        }
        RegistryProvider::Static => Arc::new(StaticResolver::from_map(
            config.registry.static_services.clone(),
        )),
        RegistryProvider::Consul => {
            let consul = &config.registry.consul;
            Arc::new(
                ConsulResolver::new(consul.address.clone(), Arc::clone(&logger))?
                    .with_scheme(&consul.scheme)
                    .with_datacenter(consul.datacenter.clone())
                    .with_token(consul.token.clone())
                    .with_tag(consul.tag.clone()),
            )
        }
    };

    let connector = McpConnector::new(transport, timeouts, Arc::clone(&logger))
        .with_scheme(mcp.scheme.clone())
        .with_path(mcp.path.clone());

    let router = AggregatedRouter::connect(
        config.registry.services.clone(),
        resolver,
        Arc::new(connector),
        config.registry.refresh_interval(),
        logger,
    )
    .await;
    Ok(router)
}
