//! Mock provider for testing
//!
//! Provides deterministic, scriptable responses without network dependencies.
//! Each completion request pops the next scripted reply; every request's
//! history is recorded so tests can assert what the model was shown.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::{ProviderError, ProviderResult};
use super::traits::{ModelProvider, StreamResponse};
use crate::logging::Logger;
use crate::types::{CancellationToken, ChatMessage, MessageRole, StreamChunk, Tool, ToolCall};

/// Text appended to a tool-call stream after the call list.
///
/// A well-behaved consumer stops reading at the call list and never sees it.
pub const TRAILING_AFTER_TOOL_CALLS: &str = "[stream continued past tool calls]";

/// One scripted model reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain text, delivered as the given chunks
    Text(Vec<String>),
    /// Optional leading text chunks, then a tool-call request
    ToolCalls {
        text: Vec<String>,
        calls: Vec<ToolCall>,
    },
    /// Signals tool use but delivers no call details
    ToolSignalWithoutDetails,
    /// Fails after emitting `delay_chunks` chunks
    Error { message: String, delay_chunks: usize },
}

impl MockReply {
    /// A plain text reply delivered as one chunk
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(vec![text.into()])
    }

    /// A single tool call with no leading text
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        MockReply::ToolCalls {
            text: vec![],
            calls: vec![ToolCall::new(id, name, arguments)],
        }
    }

    /// An error reply
    pub fn error(message: impl Into<String>) -> Self {
        MockReply::Error {
            message: message.into(),
            delay_chunks: 0,
        }
    }
}

/// Mock response mode
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Echo back the last user message
    Echo,
    /// Pop replies from a script; fails once the script runs out
    Script(Vec<MockReply>),
    /// Request the named tool on every call
    AlwaysToolCall { tool: String },
}

impl Default for MockMode {
    fn default() -> Self {
        MockMode::Echo
    }
}

/// Mock LLM provider for testing
pub struct MockProvider {
    mode: MockMode,
    script: Mutex<VecDeque<MockReply>>,
    chunk_delay_ms: u64,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    catalogs: Mutex<Vec<Vec<String>>>,
    logger: Arc<dyn Logger>,
}

impl MockProvider {
    /// Create with a specific mode
    pub fn with_mode(mode: MockMode, logger: Arc<dyn Logger>) -> Self {
        let script = match &mode {
            MockMode::Script(replies) => replies.iter().cloned().collect(),
            _ => VecDeque::new(),
        };
        Self {
            mode,
            script: Mutex::new(script),
            chunk_delay_ms: 0,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            catalogs: Mutex::new(Vec::new()),
            logger,
        }
    }

    /// Create an echo provider (echoes back user message)
    pub fn echo(logger: Arc<dyn Logger>) -> Self {
        Self::with_mode(MockMode::Echo, logger)
    }

    /// Create a provider that plays `replies` in order
    pub fn scripted(replies: Vec<MockReply>, logger: Arc<dyn Logger>) -> Self {
        Self::with_mode(MockMode::Script(replies), logger)
    }

    /// Create a provider that requests `tool` on every call
    pub fn always_tool_call(tool: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        Self::with_mode(MockMode::AlwaysToolCall { tool: tool.into() }, logger)
    }

    /// Set chunk delay
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.chunk_delay_ms = delay_ms;
        self
    }

    /// Number of completion requests served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Histories passed to each completion request, in order
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    /// Tool names advertised on each completion request, in order
    pub fn catalogs(&self) -> Vec<Vec<String>> {
        self.catalogs.lock().clone()
    }

    fn last_user_message(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User && !m.content.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "Hello from MockProvider!".to_string())
    }

    fn next_reply(&self, messages: &[ChatMessage], call_number: usize) -> MockReply {
        match &self.mode {
            MockMode::Echo => MockReply::text(format!("Echo: {}", Self::last_user_message(messages))),
            MockMode::AlwaysToolCall { tool } => {
                MockReply::tool_call(format!("call-{call_number}"), tool.clone(), serde_json::json!({}))
            }
            MockMode::Script(_) => self
                .script
                .lock()
                .pop_front()
                .unwrap_or_else(|| MockReply::error("mock script exhausted")),
        }
    }

    fn into_chunks(reply: MockReply) -> Vec<ProviderResult<StreamChunk>> {
        match reply {
            MockReply::Text(chunks) => chunks.into_iter().map(|t| Ok(StreamChunk::text(t))).collect(),
            MockReply::ToolCalls { text, calls } => text
                .into_iter()
                .map(|t| Ok(StreamChunk::text(t)))
                .chain([
                    Ok(StreamChunk::tool_calls(calls)),
                    Ok(StreamChunk::text(TRAILING_AFTER_TOOL_CALLS)),
                ])
                .collect(),
            MockReply::ToolSignalWithoutDetails => vec![Ok(StreamChunk::tool_calls(vec![]))],
            MockReply::Error { message, delay_chunks } => (0..delay_chunks)
                .map(|i| Ok(StreamChunk::text(format!("Chunk {i} before error. "))))
                .chain([Err(ProviderError::Other(format!("Mock error: {message}")))])
                .collect(),
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> ProviderResult<StreamResponse> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(messages.to_vec());
        self.catalogs
            .lock()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let reply = self.next_reply(messages, call_number);
        self.logger.debug(&format!("MockProvider: request #{call_number} -> {reply:?}"));

        let delay_ms = self.chunk_delay_ms;
        let stream = stream::iter(Self::into_chunks(reply).into_iter().enumerate()).then(
            move |(i, chunk)| {
                let cancel = cancel.clone();
                async move {
                    if i > 0 && delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    if cancel.is_cancelled() {
                        return Err(ProviderError::Cancelled);
                    }
                    chunk
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use serde_json::json;

    fn test_logger() -> Arc<dyn Logger> {
        Arc::new(NoOpLogger::new())
    }

    async fn collect(provider: &MockProvider, content: &str) -> Vec<ProviderResult<StreamChunk>> {
        let stream = provider
            .stream_complete(&[ChatMessage::user(content)], &[], CancellationToken::new())
            .await
            .expect("stream should start");
        stream.collect().await
    }

    #[tokio::test]
    async fn test_echo_mode() {
        let provider = MockProvider::echo(test_logger());
        let turn = provider
            .complete(&[ChatMessage::user("Hello, world!")], &[], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(turn.text, "Echo: Hello, world!");
        assert!(!turn.tool_use);
    }

    #[tokio::test]
    async fn test_script_plays_in_order_then_fails() {
        let provider = MockProvider::scripted(
            vec![
                MockReply::Text(vec!["First ".into(), "second.".into()]),
                MockReply::tool_call("c1", "time_now", json!({})),
            ],
            test_logger(),
        );

        let first = collect(&provider, "a").await;
        let texts: Vec<_> = first
            .into_iter()
            .map(|c| match c.unwrap() {
                StreamChunk::Text { text } => text,
                other => panic!("expected text, got {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["First ", "second."]);

        let turn = provider
            .complete(&[ChatMessage::user("b")], &[], CancellationToken::new())
            .await
            .unwrap();
        assert!(turn.tool_use);
        assert_eq!(turn.tool_calls[0].name, "time_now");
        // complete() stops at the call list
        assert!(!turn.text.contains(TRAILING_AFTER_TOOL_CALLS));

        let exhausted = provider
            .complete(&[ChatMessage::user("c")], &[], CancellationToken::new())
            .await;
        assert!(exhausted.is_err());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_always_tool_call_mode() {
        let provider = MockProvider::always_tool_call("loop_tool", test_logger());
        for n in 1..=3 {
            let turn = provider
                .complete(&[ChatMessage::user("go")], &[], CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(turn.tool_calls[0].id, format!("call-{n}"));
        }
    }

    #[tokio::test]
    async fn test_error_mode() {
        let provider = MockProvider::scripted(
            vec![MockReply::Error {
                message: "boom".into(),
                delay_chunks: 2,
            }],
            test_logger(),
        );

        let chunks = collect(&provider, "a").await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].is_ok());
        assert!(chunks[2].is_err());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let provider = MockProvider::scripted(
            vec![MockReply::Text(vec!["a".into(), "b".into(), "c".into()])],
            test_logger(),
        )
        .with_delay(10);
        let cancel = CancellationToken::new();

        let mut stream = provider
            .stream_complete(&[ChatMessage::user("a")], &[], cancel.clone())
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        cancel.cancel();
        assert!(matches!(stream.next().await, Some(Err(ProviderError::Cancelled))));
    }

    #[tokio::test]
    async fn test_records_requests_and_catalogs() {
        let provider = MockProvider::echo(test_logger());
        let tools = vec![Tool::new("time_now", "Current time")];
        provider
            .complete(&[ChatMessage::user("hi")], &tools, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.requests()[0].len(), 1);
        assert_eq!(provider.catalogs()[0], vec!["time_now".to_string()]);
    }
}
