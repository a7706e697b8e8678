//! Streaming turn events and the sinks that receive them

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::ToolCall;

/// Why a turn finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The model answered without requesting tools
    Completed,
    /// The model still wanted tools after the last permitted round
    RoundLimit,
    /// The model signalled tool use but named no calls
    NoToolDetails,
}

impl DoneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoneReason::Completed => "completed",
            DoneReason::RoundLimit => "round_limit",
            DoneReason::NoToolDetails => "no_tool_details",
        }
    }
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of a streamed turn, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A fragment of assistant text
    Delta { text: String },
    /// The model requested these calls; execution follows
    StartToolCall { round: usize, tool_calls: Vec<ToolCall> },
    /// About to invoke `name` with the parsed `args`
    ToolCall { round: usize, name: String, args: Value },
    /// `name` returned `result` (or its error text)
    ToolResult { round: usize, name: String, result: String },
    /// Terminal event; exactly one per turn
    Done { reason: DoneReason },
}

impl ChatEvent {
    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Delta { .. } => "delta",
            ChatEvent::StartToolCall { .. } => "start_tool_call",
            ChatEvent::ToolCall { .. } => "tool_call",
            ChatEvent::ToolResult { .. } => "tool_result",
            ChatEvent::Done { .. } => "done",
        }
    }

    /// Wire payload
    pub fn payload(&self) -> Value {
        match self {
            ChatEvent::Delta { text } => json!({ "text": text }),
            ChatEvent::StartToolCall { round, tool_calls } => {
                json!({ "round": round, "tool_calls": tool_calls })
            }
            ChatEvent::ToolCall { round, name, args } => {
                json!({ "round": round, "name": name, "args": args })
            }
            ChatEvent::ToolResult { round, name, result } => {
                json!({ "round": round, "name": name, "result": result })
            }
            ChatEvent::Done { reason } => json!({ "reason": reason }),
        }
    }
}

/// Delivery failure reported by a sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// The receiving side is gone
    #[error("event sink closed")]
    Closed,

    #[error("event sink: {0}")]
    Other(String),
}

/// Receives turn events synchronously and in order
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ChatEvent) -> Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: Fn(ChatEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn emit(&self, event: ChatEvent) -> Result<(), SinkError> {
        self(event)
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ChatEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards events into an unbounded channel, e.g. for an SSE writer task
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ChatEvent) -> Result<(), SinkError> {
        self.tx.send(event).map_err(|_| SinkError::Closed)
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<ChatEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    /// Wire names of the events so far
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ChatEvent::name).collect()
    }

    /// Concatenated `delta` text
    pub fn text(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for VecSink {
    fn emit(&self, event: ChatEvent) -> Result<(), SinkError> {
        self.events.lock().push(event);
        Ok(())
    }
}
