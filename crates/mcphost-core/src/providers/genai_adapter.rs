//! Adapter between mcphost types and genai types
//!
//! Conversion functions between our history/tool types and genai's, plus
//! client construction with explicit key and endpoint resolution.

use std::future::Future;
use std::pin::Pin;

use genai::chat::{
    ChatMessage as GenaiMessage, ChatOptions as GenaiOptions, ChatStreamEvent,
    MessageContent as GenaiContent, Tool as GenaiTool,
    ToolCall as GenaiToolCall, ToolResponse as GenaiToolResponse,
};
use genai::resolver::{AuthData, AuthResolver, Endpoint, ServiceTargetResolver};
use genai::{adapter::AdapterKind, Client, ModelIden, ServiceTarget};
use serde_json::json;

use crate::types::{ChatMessage, MessageRole, StreamChunk, Tool, ToolCall};

use super::error::{ProviderError, ProviderResult};
use super::traits::ProviderModelConfig;

// ============================================================================
// Message Conversion: mcphost -> genai
// ============================================================================

/// Convert one of our tool calls into genai's representation
pub fn to_genai_tool_call(call: &ToolCall) -> ProviderResult<GenaiToolCall> {
    // Built through serde so optional provider-specific fields keep their defaults
    let value = json!({
        "call_id": call.id,
        "fn_name": call.name,
        "fn_arguments": call.parsed_arguments(),
    });
    Ok(serde_json::from_value(value)?)
}

/// Convert a ChatMessage to genai ChatMessage
pub fn to_genai_message(msg: &ChatMessage) -> ProviderResult<GenaiMessage> {
    let converted = match msg.role {
        MessageRole::System => GenaiMessage::system(msg.content.clone()),
        MessageRole::User => GenaiMessage::user(msg.content.clone()),
        MessageRole::Assistant if msg.tool_calls.is_empty() => {
            GenaiMessage::assistant(msg.content.clone())
        }
        MessageRole::Assistant => {
            let calls = msg
                .tool_calls
                .iter()
                .map(to_genai_tool_call)
                .collect::<ProviderResult<Vec<_>>>()?;
            if msg.content.is_empty() {
                GenaiMessage::from(calls)
            } else {
                // Text the model streamed before asking for tools stays ahead of the calls
                let mut content = GenaiContent::from_tool_calls(calls);
                content.prepend(msg.content.clone());
                GenaiMessage::assistant(content)
            }
        }
        MessageRole::Tool => {
            let call_id = msg.tool_call_id.clone().ok_or_else(|| {
                ProviderError::Other("tool message without a tool call id".to_string())
            })?;
            GenaiMessage::from(GenaiToolResponse::new(call_id, msg.content.clone()))
        }
    };
    Ok(converted)
}

/// Convert a history to genai messages
pub fn to_genai_messages(messages: &[ChatMessage]) -> ProviderResult<Vec<GenaiMessage>> {
    messages.iter().map(to_genai_message).collect()
}

// ============================================================================
// Tool Conversion: mcphost -> genai
// ============================================================================

/// Convert a Tool to genai Tool
pub fn to_genai_tool(tool: &Tool) -> GenaiTool {
    GenaiTool::new(tool.name.clone())
        .with_description(tool.description.clone())
        .with_schema(tool.input_schema.clone())
}

/// Convert the tool catalog to genai tools
pub fn to_genai_tools(tools: &[Tool]) -> Vec<GenaiTool> {
    tools.iter().map(to_genai_tool).collect()
}

// ============================================================================
// Options Conversion
// ============================================================================

/// Build genai ChatOptions from the model config
pub fn to_genai_options(config: &ProviderModelConfig) -> GenaiOptions {
    let mut genai_opts = GenaiOptions::default();

    if let Some(temp) = config.temperature {
        genai_opts = genai_opts.with_temperature(temp);
    }

    if let Some(max_tokens) = config.max_tokens {
        genai_opts = genai_opts.with_max_tokens(max_tokens);
    }

    // Capture tool calls in stream so we can return them
    genai_opts.with_capture_tool_calls(true)
}

// ============================================================================
// Response Conversion: genai -> mcphost
// ============================================================================

/// Convert genai ToolCall to our ToolCall
pub fn from_genai_tool_call(tc: &GenaiToolCall) -> ToolCall {
    ToolCall {
        id: tc.call_id.clone(),
        name: tc.fn_name.clone(),
        arguments: tc.fn_arguments.clone(),
    }
}

/// Convert genai stream event to our StreamChunk
pub fn from_genai_event(event: ChatStreamEvent) -> Option<ProviderResult<StreamChunk>> {
    match event {
        ChatStreamEvent::Chunk(chunk) => Some(Ok(StreamChunk::Text {
            text: chunk.content,
        })),
        ChatStreamEvent::ToolCallChunk(chunk) => Some(Ok(StreamChunk::ToolCallDelta {
            id: chunk.tool_call.call_id,
            name: Some(chunk.tool_call.fn_name),
            input_delta: Some(chunk.tool_call.fn_arguments.to_string()),
        })),
        ChatStreamEvent::End(end) => {
            let calls: Vec<ToolCall> = end
                .captured_tool_calls()
                .map(|calls| calls.into_iter().map(|tc| from_genai_tool_call(tc)).collect())
                .unwrap_or_default();
            if calls.is_empty() {
                None
            } else {
                Some(Ok(StreamChunk::ToolCalls { tool_calls: calls }))
            }
        }
        _ => None,
    }
}

// ============================================================================
// Provider Resolution
// ============================================================================

/// Map a provider ID to the environment variable holding its key
pub fn provider_to_env_key(provider: &str) -> String {
    match provider.to_lowercase().as_str() {
        "openai" => "OPENAI_API_KEY".to_string(),
        "anthropic" => "ANTHROPIC_API_KEY".to_string(),
        "gemini" | "google" => "GEMINI_API_KEY".to_string(),
        "groq" => "GROQ_API_KEY".to_string(),
        "xai" => "XAI_API_KEY".to_string(),
        "deepseek" => "DEEPSEEK_API_KEY".to_string(),
        "cohere" => "COHERE_API_KEY".to_string(),
        "openrouter" => "OPENROUTER_API_KEY".to_string(),
        "mistral" => "MISTRAL_API_KEY".to_string(),
        other => format!("{}_API_KEY", other.to_uppercase()),
    }
}

/// Create a genai Client honouring an explicit key and a custom API base
pub fn create_client(provider: &str, config: &ProviderModelConfig) -> Client {
    let auth_provider = provider.to_string();
    let explicit_key = config.api_key.clone();

    let auth_resolver = AuthResolver::from_resolver_async_fn(
        move |_model_iden: ModelIden| -> Pin<Box<dyn Future<Output = genai::resolver::Result<Option<AuthData>>> + Send>> {
            let provider = auth_provider.clone();
            let explicit_key = explicit_key.clone();

            Box::pin(async move {
                if let Some(key) = explicit_key {
                    return Ok(Some(AuthData::from_single(key)));
                }
                // Local backends such as Ollama need no key
                Ok(std::env::var(provider_to_env_key(&provider))
                    .ok()
                    .map(AuthData::from_single))
            })
        },
    );

    let target_provider = provider.to_lowercase();
    let target_api_base = config.api_base.clone();

    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let ServiceTarget { ref model, .. } = target;

            let (endpoint, adapter_kind): (Option<Endpoint>, AdapterKind) = match target_provider.as_str() {
                "ollama" => (
                    target_api_base.as_ref().map(|u| Endpoint::from_owned(u.clone())),
                    AdapterKind::Ollama,
                ),
                "openrouter" => (
                    Some(Endpoint::from_static("https://openrouter.ai/api/v1/")),
                    AdapterKind::OpenAI,
                ),
                "mistral" => (
                    Some(Endpoint::from_static("https://api.mistral.ai/v1/")),
                    AdapterKind::OpenAI,
                ),
                // Any other provider with a custom base speaks the OpenAI protocol
                _ if target_api_base.is_some() => (
                    target_api_base.as_ref().map(|u| Endpoint::from_owned(u.clone())),
                    AdapterKind::OpenAI,
                ),
                _ => return Ok(target),
            };

            let resolved_endpoint = endpoint.unwrap_or(target.endpoint);
            let resolved_model = ModelIden::new(adapter_kind, model.model_name.clone());

            Ok(ServiceTarget {
                endpoint: resolved_endpoint,
                auth: target.auth,
                model: resolved_model,
            })
        },
    );

    Client::builder()
        .with_auth_resolver(auth_resolver)
        .with_service_target_resolver(target_resolver)
        .build()
}

/// Check if a provider is natively supported by genai
pub fn is_genai_native(provider: &str) -> bool {
    matches!(
        provider.to_lowercase().as_str(),
        "openai"
            | "anthropic"
            | "gemini"
            | "ollama"
            | "groq"
            | "xai"
            | "deepseek"
            | "cohere"
    )
}

/// Check if a provider can be handled by genai (native or via OpenAI-compat)
pub fn is_genai_supported(provider: &str) -> bool {
    is_genai_native(provider)
        || matches!(
            provider.to_lowercase().as_str(),
            "openrouter" | "mistral" | "openai-compatible"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_round_trip() {
        let call = ToolCall::new("c1", "get_weather", json!("{\"location\":\"NYC\"}"));
        let genai_call = to_genai_tool_call(&call).unwrap();
        assert_eq!(genai_call.call_id, "c1");
        assert_eq!(genai_call.fn_name, "get_weather");
        assert_eq!(genai_call.fn_arguments, json!({ "location": "NYC" }));

        let back = from_genai_tool_call(&genai_call);
        assert_eq!(back.arguments, json!({ "location": "NYC" }));
    }

    #[test]
    fn test_history_conversion() {
        let call = ToolCall::new("c1", "time_now", json!({}));
        let history = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("what time is it"),
            ChatMessage::assistant_tool_calls("", vec![call.clone()]),
            ChatMessage::tool_result(&call, "2024-01-01T00:00:00Z"),
        ];
        let converted = to_genai_messages(&history).unwrap();
        assert_eq!(converted.len(), 4);
    }

    #[test]
    fn test_assistant_text_kept_before_tool_calls() {
        let msg = ChatMessage::assistant_tool_calls(
            "Checking the clock. ",
            vec![ToolCall::new("c1", "time_now", json!({}))],
        );
        let converted = to_genai_message(&msg).unwrap();

        let parts = converted.content.parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_text(), Some("Checking the clock. "));
        assert_eq!(parts[1].as_tool_call().map(|c| c.call_id.as_str()), Some("c1"));
    }

    #[test]
    fn test_bare_tool_calls_carry_no_text_part() {
        let msg = ChatMessage::assistant_tool_calls("", vec![ToolCall::new("c1", "time_now", json!({}))]);
        let converted = to_genai_message(&msg).unwrap();

        assert!(converted.content.texts().is_empty());
        assert_eq!(converted.content.tool_calls().len(), 1);
    }

    #[test]
    fn test_orphan_tool_message_rejected() {
        let mut msg = ChatMessage::tool_result(&ToolCall::new("c1", "x", json!({})), "out");
        msg.tool_call_id = None;
        assert!(to_genai_message(&msg).is_err());
    }

    #[test]
    fn test_tool_conversion() {
        let tool = Tool::new("get_weather", "Get weather for a location");
        let genai_tool = to_genai_tool(&tool);
        assert_eq!(genai_tool.name, "get_weather");
    }

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(provider_to_env_key("openai"), "OPENAI_API_KEY");
        assert_eq!(provider_to_env_key("Gemini"), "GEMINI_API_KEY");
        assert_eq!(provider_to_env_key("acme"), "ACME_API_KEY");
    }

    #[test]
    fn test_provider_detection() {
        assert!(is_genai_native("openai"));
        assert!(is_genai_native("ollama"));
        assert!(!is_genai_native("openrouter"));

        assert!(is_genai_supported("openrouter"));
        assert!(is_genai_supported("openai-compatible"));
        assert!(!is_genai_supported("unknown_provider"));
    }
}
