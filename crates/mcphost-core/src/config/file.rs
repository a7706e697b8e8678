//! Host configuration file (YAML)
//!
//! User-level config lives at `~/.config/mcphost/config.yaml`; any other path
//! can be loaded explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineOptions, DEFAULT_MAX_ROUNDS};
use crate::mcp::{McpTimeouts, TransportKind, DEFAULT_CALL_TIMEOUT, DEFAULT_INIT_TIMEOUT};
use crate::providers::ProviderModelConfig;

use super::error::{ConfigError, ConfigResult};

/// Shortest allowed interval between discovery refreshes
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Complete host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub provider: ProviderSection,
    pub mcp: McpSection,
    pub registry: RegistrySection,
    pub engine: EngineSection,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Provider id (`openai`, `ollama`, ..., or `mock`)
    pub id: String,
    /// Model name, optionally prefixed with the provider (`openai/gpt-4o`)
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            id: "mock".to_string(),
            model: String::new(),
            api_key: None,
            api_base: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ProviderSection {
    /// Request settings handed to the provider
    pub fn model_config(&self) -> ProviderModelConfig {
        let mut config = ProviderModelConfig::new(self.model.clone());
        config.api_key = self.api_key.clone();
        config.api_base = self.api_base.clone();
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        config
    }
}

/// How backends are reached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSection {
    /// `stdio`, `http`, `sse` (alias of `http`) or `unix`
    pub transport: String,
    /// Server executable for `stdio`
    pub server_cmd: String,
    pub server_args: Vec<String>,
    /// Endpoint of a single `http` backend when no registry is used
    pub base_url: String,
    /// Socket of a single `unix` backend when no registry is used
    pub socket_path: String,
    /// Scheme for discovered `host:port` addresses
    pub scheme: String,
    /// Endpoint path for discovered `host:port` addresses
    pub path: String,
    pub init_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            server_cmd: String::new(),
            server_args: Vec::new(),
            base_url: String::new(),
            socket_path: String::new(),
            scheme: "http".to_string(),
            path: "/mcp".to_string(),
            init_timeout_secs: DEFAULT_INIT_TIMEOUT.as_secs(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
        }
    }
}

impl McpSection {
    pub fn transport_kind(&self) -> ConfigResult<TransportKind> {
        self.transport
            .parse()
            .map_err(|_| ConfigError::UnsupportedTransport(self.transport.clone()))
    }

    pub fn timeouts(&self) -> McpTimeouts {
        McpTimeouts {
            init: Duration::from_secs(self.init_timeout_secs),
            call: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Discovery backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryProvider {
    /// One fixed backend from the `mcp` section
    #[default]
    None,
    /// Addresses listed under `registry.static`
    Static,
    /// Healthy instances from a Consul agent
    Consul,
}

/// Service discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub provider: RegistryProvider,
    /// Logical service names to watch
    pub services: Vec<String>,
    pub refresh_interval_secs: u64,
    pub consul: ConsulSection,
    #[serde(rename = "static")]
    pub static_services: BTreeMap<String, Vec<String>>,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            provider: RegistryProvider::None,
            services: Vec::new(),
            refresh_interval_secs: MIN_REFRESH_INTERVAL.as_secs(),
            consul: ConsulSection::default(),
            static_services: BTreeMap::new(),
        }
    }
}

impl RegistrySection {
    /// Refresh interval, never shorter than [`MIN_REFRESH_INTERVAL`]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs).max(MIN_REFRESH_INTERVAL)
    }
}

/// Consul agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulSection {
    /// Agent `host:port`
    pub address: String,
    pub scheme: String,
    pub datacenter: String,
    pub token: String,
    /// Only instances carrying this tag
    pub tag: String,
}

impl Default for ConsulSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            datacenter: String::new(),
            token: String::new(),
            tag: String::new(),
        }
    }
}

/// Turn policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub abort_on_sink_error: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            system_prompt: None,
            abort_on_sink_error: false,
        }
    }
}

impl EngineSection {
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            max_rounds: self.max_rounds,
            system_prompt: self.system_prompt.clone().filter(|p| !p.trim().is_empty()),
            abort_on_sink_error: self.abort_on_sink_error,
        }
    }
}

impl HostConfig {
    /// Default user-level config path (~/.config/mcphost/config.yaml)
    pub fn user_path() -> PathBuf {
        // XDG config directory (~/.config on Linux, ~/Library/Application Support on macOS)
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        config_dir.join("mcphost").join("config.yaml")
    }

    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: HostConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML
    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.provider.id.trim().is_empty() {
            return Err(ConfigError::invalid("provider.id must be set"));
        }
        if self.provider.id != "mock" && self.provider.model.trim().is_empty() {
            return Err(ConfigError::invalid("provider.model must be set"));
        }
        if self.engine.max_rounds == 0 {
            return Err(ConfigError::invalid("engine.max_rounds must be at least 1"));
        }
        if self.mcp.init_timeout_secs == 0 || self.mcp.call_timeout_secs == 0 {
            return Err(ConfigError::invalid("mcp timeouts must be positive"));
        }

        let transport = self.mcp.transport_kind()?;
        if transport == TransportKind::Stdio {
            if self.mcp.server_cmd.trim().is_empty() {
                return Err(ConfigError::invalid("mcp.server_cmd is required for stdio"));
            }
            return Ok(());
        }

        match self.registry.provider {
            RegistryProvider::None => match transport {
                TransportKind::Http if self.mcp.base_url.trim().is_empty() => Err(
                    ConfigError::invalid("mcp.base_url is required without a registry"),
                ),
                TransportKind::Unix if self.mcp.socket_path.trim().is_empty() => Err(
                    ConfigError::invalid("mcp.socket_path is required without a registry"),
                ),
                _ => Ok(()),
            },
            RegistryProvider::Static | RegistryProvider::Consul => {
                if self.registry.services.iter().all(|s| s.trim().is_empty()) {
                    return Err(ConfigError::invalid("registry.services must name at least one service"));
                }
                if self.registry.provider == RegistryProvider::Consul
                    && self.registry.consul.address.trim().is_empty()
                {
                    return Err(ConfigError::invalid("registry.consul.address must be set"));
                }
                Ok(())
            }
        }
    }
}
