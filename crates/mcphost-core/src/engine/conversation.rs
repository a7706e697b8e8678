//! The tool-use round loop
//!
//! A turn appends the user message, then alternates model calls and tool
//! execution until the model answers without tools, names no calls, or
//! exceeds `max_rounds`. History is written back to the store only when the
//! turn reaches one of those outcomes.

use std::sync::Arc;

use futures::StreamExt;

use crate::log_warn;
use crate::logging::Logger;
use crate::providers::ModelProvider;
use crate::tools::ToolRouter;
use crate::types::{AssistantTurn, CancellationToken, ChatMessage, StreamChunk, Tool};

use super::error::{EngineError, EngineResult};
use super::events::{ChatEvent, DoneReason, EventSink, NullSink};
use super::store::ConversationStore;

/// Default upper bound on tool rounds per turn
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Per-engine turn policy
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Tool rounds allowed per turn
    pub max_rounds: usize,
    /// Seeds new conversations as a system message
    pub system_prompt: Option<String>,
    /// Fail the turn when the sink rejects an event instead of logging it
    pub abort_on_sink_error: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            system_prompt: None,
            abort_on_sink_error: false,
        }
    }
}

impl EngineOptions {
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_abort_on_sink_error(mut self, abort: bool) -> Self {
        self.abort_on_sink_error = abort;
        self
    }
}

/// Result of a finished turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the last model reply
    pub text: String,
    pub reason: DoneReason,
    /// Tool rounds executed
    pub rounds: usize,
}

#[derive(Clone, Copy)]
enum Delivery {
    Buffered,
    Streaming,
}

/// Drives conversations against a model provider and a tool router
pub struct ConversationEngine {
    provider: Arc<dyn ModelProvider>,
    router: Arc<dyn ToolRouter>,
    store: Arc<dyn ConversationStore>,
    options: EngineOptions,
    logger: Arc<dyn Logger>,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        router: Arc<dyn ToolRouter>,
        store: Arc<dyn ConversationStore>,
        options: EngineOptions,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            provider,
            router,
            store,
            options,
            logger,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current history of a conversation (empty if unknown)
    pub fn history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.store.load(conversation_id).unwrap_or_default()
    }

    /// Run one turn with buffered model replies and return the final text
    pub async fn chat(&self, conversation_id: &str, user_text: &str) -> EngineResult<String> {
        let outcome = self
            .run_turn(
                &CancellationToken::new(),
                conversation_id,
                user_text,
                &NullSink,
                Delivery::Buffered,
            )
            .await?;
        Ok(outcome.text)
    }

    /// Run one turn, streaming events to `sink` as they happen
    pub async fn stream_chat(
        &self,
        cancel: &CancellationToken,
        conversation_id: &str,
        user_text: &str,
        sink: &dyn EventSink,
    ) -> EngineResult<TurnOutcome> {
        self.run_turn(cancel, conversation_id, user_text, sink, Delivery::Streaming)
            .await
    }

    async fn run_turn(
        &self,
        cancel: &CancellationToken,
        conversation_id: &str,
        user_text: &str,
        sink: &dyn EventSink,
        delivery: Delivery,
    ) -> EngineResult<TurnOutcome> {
        let mut history = self.store.load(conversation_id).unwrap_or_default();
        if history.is_empty() {
            if let Some(prompt) = &self.options.system_prompt {
                history.push(ChatMessage::system(prompt.clone()));
            }
        }
        history.push(ChatMessage::user(user_text));

        let mut round = 1;
        loop {
            let catalog = self.router.catalog();
            let turn = match delivery {
                Delivery::Buffered => self.complete(cancel, &history, &catalog).await?,
                Delivery::Streaming => self.stream(cancel, &history, &catalog, sink).await?,
            };

            let reason = if !turn.tool_use {
                Some(DoneReason::Completed)
            } else if turn.tool_calls.is_empty() {
                log_warn!(
                    self.logger,
                    "conversation {}: model signalled tool use without calls",
                    conversation_id
                );
                Some(DoneReason::NoToolDetails)
            } else if round > self.options.max_rounds {
                log_warn!(
                    self.logger,
                    "conversation {}: round limit {} reached, dropping {} tool calls",
                    conversation_id,
                    self.options.max_rounds,
                    turn.tool_calls.len()
                );
                Some(DoneReason::RoundLimit)
            } else {
                None
            };

            if let Some(reason) = reason {
                if !turn.text.is_empty() {
                    history.push(ChatMessage::assistant(turn.text.clone()));
                }
                self.store.save(conversation_id, history);
                self.emit(sink, ChatEvent::Done { reason })?;
                return Ok(TurnOutcome {
                    text: turn.text,
                    reason,
                    rounds: round - 1,
                });
            }

            let AssistantTurn {
                text, tool_calls, ..
            } = turn;
            self.emit(
                sink,
                ChatEvent::StartToolCall {
                    round,
                    tool_calls: tool_calls.clone(),
                },
            )?;
            history.push(ChatMessage::assistant_tool_calls(text, tool_calls.clone()));

            for call in &tool_calls {
                let args = call.parsed_arguments();
                self.emit(
                    sink,
                    ChatEvent::ToolCall {
                        round,
                        name: call.name.clone(),
                        args: args.clone(),
                    },
                )?;

                let result = match cancel
                    .run_until_cancelled(self.router.invoke(&call.name, args))
                    .await
                {
                    None => return Err(EngineError::Cancelled),
                    Some(Ok(output)) => output,
                    Some(Err(e)) => {
                        self.logger
                            .warn(&format!("tool {} failed: {}", call.name, e));
                        format!("tool error: {}", e)
                    }
                };
                self.logger.info(&format!("[tool] {} executed", call.name));

                self.emit(
                    sink,
                    ChatEvent::ToolResult {
                        round,
                        name: call.name.clone(),
                        result: result.clone(),
                    },
                )?;
                history.push(ChatMessage::tool_result(call, result));
            }

            round += 1;
        }
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        history: &[ChatMessage],
        catalog: &[Tool],
    ) -> EngineResult<AssistantTurn> {
        match cancel
            .run_until_cancelled(self.provider.complete(history, catalog, cancel.clone()))
            .await
        {
            Some(turn) => Ok(turn?),
            None => Err(EngineError::Cancelled),
        }
    }

    /// Consume one streamed reply, forwarding text as it arrives.
    ///
    /// Reading stops at the tool-call list; whatever the provider would send
    /// after it is discarded along with the stream.
    async fn stream(
        &self,
        cancel: &CancellationToken,
        history: &[ChatMessage],
        catalog: &[Tool],
        sink: &dyn EventSink,
    ) -> EngineResult<AssistantTurn> {
        let mut stream = match cancel
            .run_until_cancelled(self.provider.stream_complete(history, catalog, cancel.clone()))
            .await
        {
            Some(stream) => stream?,
            None => return Err(EngineError::Cancelled),
        };

        let mut turn = AssistantTurn::default();
        loop {
            let next = match cancel.run_until_cancelled(stream.next()).await {
                Some(next) => next,
                None => return Err(EngineError::Cancelled),
            };
            match next.transpose()? {
                None => break,
                Some(StreamChunk::Text { text }) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.emit(sink, ChatEvent::Delta { text: text.clone() })?;
                    turn.text.push_str(&text);
                }
                Some(StreamChunk::ToolCallDelta { .. }) => {}
                Some(chunk @ StreamChunk::ToolCalls { .. }) => {
                    turn.absorb(chunk);
                    break;
                }
            }
        }
        Ok(turn)
    }

    fn emit(&self, sink: &dyn EventSink, event: ChatEvent) -> EngineResult<()> {
        let name = event.name();
        match sink.emit(event) {
            Ok(()) => Ok(()),
            Err(e) if self.options.abort_on_sink_error => Err(EngineError::SinkClosed(e)),
            Err(e) => {
                log_warn!(self.logger, "dropped {} event: {}", name, e);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryConversationStore, SinkError, VecSink};
    use crate::logging::{NoOpLogger, RecordingLogger};
    use crate::providers::{MockProvider, MockReply, TRAILING_AFTER_TOOL_CALLS};
    use crate::tools::{LocalBackend, SingleBackendRouter};
    use crate::types::{MessageRole, ToolCall};
    use serde_json::json;

    const NOW: &str = "2024-01-01T12:00:00Z";

    struct Fixture {
        provider: Arc<MockProvider>,
        backend: Arc<LocalBackend>,
        store: Arc<MemoryConversationStore>,
        engine: ConversationEngine,
    }

    fn fixture(provider: MockProvider, options: EngineOptions) -> Fixture {
        fixture_with_logger(provider, options, Arc::new(NoOpLogger::new()))
    }

    fn fixture_with_logger(
        provider: MockProvider,
        options: EngineOptions,
        logger: Arc<dyn Logger>,
    ) -> Fixture {
        let provider = Arc::new(provider);
        let backend = Arc::new(
            LocalBackend::new("local")
                .with_fixed("time_now", NOW)
                .with_tool(Tool::new("echo", "Echo arguments"), |args| Ok(args.to_string())),
        );
        let router = Arc::new(SingleBackendRouter::new(backend.clone(), logger.clone()));
        let store = Arc::new(MemoryConversationStore::new());
        let engine = ConversationEngine::new(
            provider.clone(),
            router,
            store.clone(),
            options,
            logger,
        );
        Fixture {
            provider,
            backend,
            store,
            engine,
        }
    }

    fn logger() -> Arc<dyn Logger> {
        Arc::new(NoOpLogger::new())
    }

    /// Every tool message answers a call made by an earlier assistant message
    fn assert_results_follow_calls(history: &[ChatMessage]) {
        for (i, msg) in history.iter().enumerate() {
            if msg.role != MessageRole::Tool {
                continue;
            }
            let id = msg.tool_call_id.as_deref().expect("tool message without call id");
            assert!(
                history[..i].iter().any(|prior| prior.role == MessageRole::Assistant
                    && prior.tool_calls.iter().any(|c| c.id == id)),
                "tool result {} at {} has no preceding call",
                id,
                i
            );
        }
    }

    #[tokio::test]
    async fn test_plain_turns_grow_history_by_two() {
        let f = fixture(MockProvider::echo(logger()), EngineOptions::default());

        for n in 1..=3 {
            let reply = f.engine.chat("c", &format!("msg {n}")).await.unwrap();
            assert_eq!(reply, format!("Echo: msg {n}"));
            assert_eq!(f.engine.history("c").len(), 2 * n);
        }
        assert_eq!(f.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_time_now_end_to_end() {
        let f = fixture(
            MockProvider::scripted(
                vec![
                    MockReply::tool_call("c1", "time_now", json!({})),
                    MockReply::Text(vec!["It is ".into(), NOW.into()]),
                ],
                logger(),
            ),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        let outcome = f
            .engine
            .stream_chat(&CancellationToken::new(), "conv", "what time is it?", &sink)
            .await
            .unwrap();

        assert_eq!(outcome.reason, DoneReason::Completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.text, format!("It is {NOW}"));
        assert_eq!(
            sink.names(),
            vec!["start_tool_call", "tool_call", "tool_result", "delta", "delta", "done"]
        );
        assert_eq!(
            sink.events()[2],
            ChatEvent::ToolResult {
                round: 1,
                name: "time_now".into(),
                result: NOW.into()
            }
        );

        let history = f.engine.history("conv");
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant
            ]
        );
        assert_eq!(history[1].tool_calls[0].id, "c1");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[2].content, NOW);

        // The second model call saw the tool result
        let second = &f.provider.requests()[1];
        assert_eq!(second.last().unwrap().role, MessageRole::Tool);
    }

    #[tokio::test]
    async fn test_always_tool_hits_round_limit() {
        let f = fixture(
            MockProvider::always_tool_call("time_now", logger()),
            EngineOptions::default().with_max_rounds(3),
        );
        let sink = VecSink::new();

        let outcome = f
            .engine
            .stream_chat(&CancellationToken::new(), "c", "loop", &sink)
            .await
            .unwrap();

        assert_eq!(outcome.reason, DoneReason::RoundLimit);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(f.provider.call_count(), 4);
        assert_eq!(f.backend.call_count(), 3);
        assert_eq!(
            sink.events().last(),
            Some(&ChatEvent::Done {
                reason: DoneReason::RoundLimit
            })
        );
        // user + 3 x (assistant call + tool result)
        let history = f.engine.history("c");
        assert_eq!(history.len(), 7);
        assert_results_follow_calls(&history);
    }

    #[tokio::test]
    async fn test_stream_consumption_stops_at_tool_calls() {
        let f = fixture(
            MockProvider::scripted(
                vec![
                    MockReply::ToolCalls {
                        text: vec!["Checking. ".into()],
                        calls: vec![ToolCall::new("c1", "time_now", json!({}))],
                    },
                    MockReply::text("Done."),
                ],
                logger(),
            ),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        f.engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &sink)
            .await
            .unwrap();

        assert_eq!(sink.text(), "Checking. Done.");
        assert!(!sink.text().contains(TRAILING_AFTER_TOOL_CALLS));
        // Leading text rides on the assistant message that carries the calls
        assert_eq!(f.engine.history("c")[1].content, "Checking. ");
    }

    #[tokio::test]
    async fn test_tool_errors_become_results() {
        let f = fixture(
            MockProvider::scripted(
                vec![
                    MockReply::ToolCalls {
                        text: vec![],
                        calls: vec![
                            ToolCall::new("c1", "ghost", json!({})),
                            ToolCall::new("c2", "time_now", json!({})),
                        ],
                    },
                    MockReply::text("ok"),
                ],
                logger(),
            ),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        let outcome = f
            .engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &sink)
            .await
            .unwrap();
        assert_eq!(outcome.reason, DoneReason::Completed);

        let history = f.engine.history("c");
        assert!(history[2].content.starts_with("tool error: "));
        assert!(history[2].content.contains("ghost"));
        assert_eq!(history[3].content, NOW);
        assert_results_follow_calls(&history);
        assert_eq!(
            sink.names(),
            vec![
                "start_tool_call",
                "tool_call",
                "tool_result",
                "tool_call",
                "tool_result",
                "delta",
                "done"
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_passed_as_diagnostic() {
        let f = fixture(
            MockProvider::scripted(
                vec![
                    MockReply::tool_call("c1", "echo", json!("{not json")),
                    MockReply::text("ok"),
                ],
                logger(),
            ),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        f.engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &sink)
            .await
            .unwrap();

        match &sink.events()[1] {
            ChatEvent::ToolCall { args, .. } => {
                assert!(args.get("_parse_error").is_some());
                assert_eq!(args["_raw"], "{not json");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(f.engine.history("c")[2].content.contains("_parse_error"));
    }

    #[tokio::test]
    async fn test_tool_signal_without_details() {
        let f = fixture(
            MockProvider::scripted(vec![MockReply::ToolSignalWithoutDetails], logger()),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        let outcome = f
            .engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &sink)
            .await
            .unwrap();

        assert_eq!(outcome.reason, DoneReason::NoToolDetails);
        assert_eq!(sink.names(), vec!["done"]);
        assert_eq!(f.engine.history("c").len(), 1);
        assert_eq!(f.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_fails_turn_without_saving() {
        let f = fixture(
            MockProvider::scripted(
                vec![MockReply::Error {
                    message: "overloaded".into(),
                    delay_chunks: 1,
                }],
                logger(),
            ),
            EngineOptions::default(),
        );
        let sink = VecSink::new();

        let result = f
            .engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &sink)
            .await;

        assert!(matches!(result, Err(EngineError::Provider(_))));
        assert!(f.store.is_empty());
        assert!(!sink.names().contains(&"done"));
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream() {
        let f = fixture(
            MockProvider::scripted(
                vec![MockReply::Text(vec!["a".into(), "b".into(), "c".into()])],
                logger(),
            )
            .with_delay(50),
            EngineOptions::default(),
        );
        let cancel = CancellationToken::new();
        let sink = {
            let cancel = cancel.clone();
            move |event: ChatEvent| -> Result<(), SinkError> {
                if matches!(event, ChatEvent::Delta { .. }) {
                    cancel.cancel();
                }
                Ok(())
            }
        };

        let result = f.engine.stream_chat(&cancel, "c", "hi", &sink).await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(f.engine.history("c").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_reaches_running_tool() {
        let backend = Arc::new(
            LocalBackend::new("slow")
                .with_fixed("time_now", NOW)
                .with_call_delay(std::time::Duration::from_secs(30)),
        );
        let store = Arc::new(MemoryConversationStore::new());
        let engine = ConversationEngine::new(
            Arc::new(MockProvider::scripted(
                vec![
                    MockReply::tool_call("c1", "time_now", json!({})),
                    MockReply::text("unreachable"),
                ],
                logger(),
            )),
            Arc::new(SingleBackendRouter::new(backend.clone(), logger())),
            store.clone(),
            EngineOptions::default(),
            logger(),
        );

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };
        let sink = VecSink::new();
        let started = tokio::time::Instant::now();

        let result = engine.stream_chat(&cancel, "c", "what time is it?", &sink).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(sink.names(), vec!["start_tool_call", "tool_call"]);
        assert!(store.is_empty());
        assert!(engine.history("c").is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_policy() {
        let failing = |_event: ChatEvent| -> Result<(), SinkError> { Err(SinkError::Closed) };

        let lenient_logger = Arc::new(RecordingLogger::new());
        let lenient = fixture_with_logger(
            MockProvider::echo(logger()),
            EngineOptions::default(),
            lenient_logger.clone(),
        );
        let outcome = lenient
            .engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &failing)
            .await
            .unwrap();
        assert_eq!(outcome.reason, DoneReason::Completed);
        assert!(lenient_logger.contains("WARN", "dropped delta event"));
        assert_eq!(lenient.engine.history("c").len(), 2);

        let strict = fixture(
            MockProvider::echo(logger()),
            EngineOptions::default().with_abort_on_sink_error(true),
        );
        let result = strict
            .engine
            .stream_chat(&CancellationToken::new(), "c", "hi", &failing)
            .await;
        assert!(matches!(result, Err(EngineError::SinkClosed(SinkError::Closed))));
    }

    #[tokio::test]
    async fn test_system_prompt_seeds_new_conversations_once() {
        let f = fixture(
            MockProvider::echo(logger()),
            EngineOptions::default().with_system_prompt("You are terse."),
        );

        f.engine.chat("c", "one").await.unwrap();
        f.engine.chat("c", "two").await.unwrap();

        let history = f.engine.history("c");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(
            history.iter().filter(|m| m.role == MessageRole::System).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_buffered_chat_runs_tool_rounds() {
        let f = fixture(
            MockProvider::scripted(
                vec![
                    MockReply::tool_call("c1", "time_now", json!({})),
                    MockReply::text("noon"),
                ],
                logger(),
            ),
            EngineOptions::default(),
        );

        assert_eq!(f.engine.chat("c", "time?").await.unwrap(), "noon");
        assert_eq!(f.backend.call_count(), 1);
        // Every model call saw the catalog
        for catalog in f.provider.catalogs() {
            assert_eq!(catalog, vec!["echo".to_string(), "time_now".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_conversations_do_not_share_history() {
        let f = fixture(MockProvider::echo(logger()), EngineOptions::default());

        f.engine.chat("a", "for a").await.unwrap();
        f.engine.chat("b", "for b").await.unwrap();

        assert_eq!(f.engine.history("a")[0].content, "for a");
        assert_eq!(f.engine.history("b")[0].content, "for b");
        // Only the current conversation is sent to the model
        assert_eq!(f.provider.requests()[1].len(), 1);
    }
}
