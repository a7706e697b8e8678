//! LLM Provider implementations
//!
//! All real model backends go through the `genai` crate, which handles
//! streaming, provider-specific protocols and tool calling. Providers not
//! native to genai (OpenRouter, Mistral, any OpenAI-compatible base URL) are
//! routed with genai's `ServiceTargetResolver`.
//!
//! The `MockProvider` plays scripted replies for tests.

mod traits;
mod error;
mod genai_adapter;
mod genai_provider;
mod mock;

pub use traits::{ModelProvider, ProviderModelConfig, StreamResponse};
pub use error::{ProviderError, ProviderResult};

pub use genai_provider::GenaiProvider;
pub use genai_adapter::{is_genai_native, is_genai_supported};

pub use mock::{MockMode, MockProvider, MockReply, TRAILING_AFTER_TOOL_CALLS};

use crate::config::ProviderSection;
use crate::logging::Logger;
use std::sync::Arc;

/// Create the model provider described by `config`
///
/// `mock` yields an echo provider. Any id genai can serve, or any id with an
/// explicit `api_base`, yields a [`GenaiProvider`].
pub fn create_provider(
    config: &ProviderSection,
    logger: Arc<dyn Logger>,
) -> ProviderResult<Arc<dyn ModelProvider>> {
    let id = config.id.to_lowercase();
    match id.as_str() {
        "mock" => Ok(Arc::new(MockProvider::echo(logger))),
        _ if GenaiProvider::supports(&id) || config.api_base.is_some() => {
            logger.info(&format!("Using provider {} with model {}", id, config.model));
            Ok(Arc::new(GenaiProvider::new(id, config.model_config(), logger)))
        }
        _ => Err(ProviderError::Unsupported(config.id.clone())),
    }
}

/// List all supported provider IDs
pub fn supported_providers() -> Vec<&'static str> {
    vec![
        // Native genai providers
        "openai",
        "anthropic",
        "gemini",
        "ollama",
        "groq",
        "xai",
        "deepseek",
        "cohere",
        // OpenAI-compatible providers via resolver
        "openrouter",
        "mistral",
        "openai-compatible",
        // Testing
        "mock",
    ]
}
