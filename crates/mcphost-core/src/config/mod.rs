//! Host configuration
//!
//! A single YAML document selects the model provider, how MCP backends are
//! reached, the discovery registry and the turn policy.

mod error;
mod file;

pub use error::{ConfigError, ConfigResult};
pub use file::{
    ConsulSection, EngineSection, HostConfig, McpSection, ProviderSection, RegistryProvider,
    RegistrySection, MIN_REFRESH_INTERVAL,
};
