//! GenaiProvider - Unified provider using the genai crate
//!
//! This provider handles all genai-supported providers (OpenAI, Anthropic, Gemini, etc.)
//! as well as OpenAI-compatible endpoints via the ServiceTargetResolver.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use genai::chat::{ChatRequest, ChatStreamEvent};
use genai::Client;

use crate::logging::Logger;
use crate::types::{CancellationToken, ChatMessage, Tool};

use super::error::{ProviderError, ProviderResult};
use super::genai_adapter::{
    create_client, from_genai_event, is_genai_supported, to_genai_messages, to_genai_options,
    to_genai_tools,
};
use super::traits::{ModelProvider, ProviderModelConfig, StreamResponse};

/// Unified provider using genai for all supported LLM APIs
pub struct GenaiProvider {
    /// Provider identifier
    provider_id: String,
    /// Model, credentials and sampling settings
    config: ProviderModelConfig,
    client: Client,
    /// Logger for debug output
    logger: Arc<dyn Logger>,
}

impl GenaiProvider {
    /// Create a new GenaiProvider
    pub fn new(
        provider_id: impl Into<String>,
        config: ProviderModelConfig,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let provider_id = provider_id.into();
        let client = create_client(&provider_id, &config);
        Self {
            provider_id,
            config,
            client,
            logger,
        }
    }

    /// Check if this provider can handle the given provider ID
    pub fn supports(provider_id: &str) -> bool {
        is_genai_supported(provider_id)
    }

    /// Model config this provider was built with
    pub fn config(&self) -> &ProviderModelConfig {
        &self.config
    }

    /// Extract model name from a model string (e.g., "openai/gpt-4" -> "gpt-4")
    pub fn extract_model_name(model: &str) -> &str {
        model.split_once('/').map(|(_, name)| name).unwrap_or(model)
    }
}

#[async_trait]
impl ModelProvider for GenaiProvider {
    fn name(&self) -> &str {
        &self.provider_id
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse> {
        let model_name = Self::extract_model_name(&self.config.model);
        self.logger.debug(&format!(
            "[GenaiProvider] stream_complete: provider={}, model={}, messages={}, tools={}",
            self.provider_id,
            model_name,
            messages.len(),
            tools.len()
        ));

        let mut chat_req = ChatRequest::new(to_genai_messages(messages)?);
        if !tools.is_empty() {
            chat_req = chat_req.with_tools(to_genai_tools(tools));
        }
        let genai_options = to_genai_options(&self.config);

        let chat_stream = tokio::select! {
            result = self.client.exec_chat_stream(model_name, chat_req, Some(&genai_options)) => {
                result.map_err(|e| ProviderError::api_error(self.provider_id.clone(), 500, e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        self.logger.debug("[GenaiProvider] Stream started");

        let logger = Arc::clone(&self.logger);
        let provider_id = self.provider_id.clone();

        let stream = chat_stream.stream.filter_map(move |result| {
            let cancel = cancel.clone();
            let logger = Arc::clone(&logger);
            let provider_id = provider_id.clone();

            async move {
                if cancel.is_cancelled() {
                    logger.info("[GenaiProvider] Stream cancelled");
                    return Some(Err(ProviderError::Cancelled));
                }

                match result {
                    Ok(event) => {
                        match &event {
                            ChatStreamEvent::Chunk(c) => {
                                logger.debug(&format!(
                                    "[GenaiProvider] Chunk ({} chars)",
                                    c.content.len()
                                ));
                            }
                            ChatStreamEvent::End(_) => {
                                logger.debug("[GenaiProvider] End");
                            }
                            _ => {}
                        }
                        from_genai_event(event)
                    }
                    Err(e) => {
                        logger.error(&format!("[GenaiProvider] Stream error: {}", e));
                        Some(Err(ProviderError::api_error(provider_id, 500, e.to_string())))
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;

    #[test]
    fn test_extract_model_name() {
        assert_eq!(GenaiProvider::extract_model_name("openai/gpt-4"), "gpt-4");
        assert_eq!(
            GenaiProvider::extract_model_name("openrouter/meta-llama/llama-3"),
            "meta-llama/llama-3"
        );
        assert_eq!(GenaiProvider::extract_model_name("gpt-4"), "gpt-4");
    }

    #[test]
    fn test_supports() {
        assert!(GenaiProvider::supports("openai"));
        assert!(GenaiProvider::supports("anthropic"));
        assert!(GenaiProvider::supports("openrouter"));
        assert!(!GenaiProvider::supports("unknown_provider"));
    }

    #[test]
    fn test_name_and_config() {
        let provider = GenaiProvider::new(
            "ollama",
            ProviderModelConfig::new("llama3.2").with_api_base("http://localhost:11434/"),
            Arc::new(NoOpLogger::new()),
        );
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.config().model, "llama3.2");
    }
}
