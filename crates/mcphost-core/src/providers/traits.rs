//! Provider trait definition

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::types::{AssistantTurn, CancellationToken, ChatMessage, StreamChunk, Tool};
use super::error::ProviderResult;

/// Model configuration for provider requests
#[derive(Debug, Clone)]
pub struct ProviderModelConfig {
    /// Model identifier as used by the provider's API
    pub model: String,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl ProviderModelConfig {
    /// Create a new model config
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            api_base: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the API base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// Type alias for the streaming response
pub type StreamResponse = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Chat-completion backend used by the conversation engine
///
/// Streams yield text fragments as they arrive and, when the assistant turn
/// ends in tool use, one final [`StreamChunk::ToolCalls`]. Consumers stop
/// reading by dropping the stream, which is never reported as an error.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Stream a chat completion over `messages`, advertising `tools`
    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse>;

    /// Buffered chat completion.
    ///
    /// The default drains [`ModelProvider::stream_complete`] up to and
    /// including the tool-call list.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> ProviderResult<AssistantTurn> {
        let mut stream = self.stream_complete(messages, tools, cancel).await?;
        let mut turn = AssistantTurn::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let ends_turn = matches!(chunk, StreamChunk::ToolCalls { .. });
            turn.absorb(chunk);
            if ends_turn {
                break;
            }
        }
        Ok(turn)
    }
}
