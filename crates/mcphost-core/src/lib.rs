//! mcphost Core
//!
//! Host-side runtime for tool-using LLM conversations over MCP.
//!
//! A [`ConversationEngine`] streams model output, routes every tool call the
//! model makes through a [`ToolRouter`] and feeds the results back until the
//! model answers in plain text. Routers either wrap one MCP server or
//! aggregate every server a [`DiscoveryResolver`] finds under a set of
//! service names.
//!
//! ```rust,ignore
//! use mcphost_core::{HostConfig, HostContext, TracingLogger};
//!
//! let logger = Arc::new(TracingLogger::new());
//! let host = HostContext::from_config(HostConfig::load(HostConfig::user_path())?, logger).await?;
//!
//! let reply = host.engine().chat("conv-1", "what time is it?").await?;
//! host.shutdown().await;
//! ```

pub mod types;
pub mod logging;
pub mod config;
pub mod providers;
pub mod mcp;
pub mod discovery;
pub mod tools;
pub mod engine;
pub mod host;

pub use types::{
    AssistantTurn, CancellationToken, ChatMessage, MessageRole, StreamChunk, Tool, ToolCall,
};

pub use logging::{init_tracing, Logger, NoOpLogger, TracingLogger};

pub use config::{ConfigError, HostConfig};

pub use providers::{create_provider, ModelProvider, ProviderError};

pub use mcp::{McpClient, McpError};

pub use discovery::{ConsulResolver, DiscoveryResolver, StaticResolver};

pub use tools::{AggregatedRouter, RouterError, SingleBackendRouter, ToolRouter};

pub use engine::{
    ChatEvent, ConversationEngine, DoneReason, EngineError, EngineOptions, EventSink,
};

pub use host::{HostContext, HostError};
