//! Streaming response types

use serde::{Deserialize, Serialize};
use super::tool::ToolCall;

/// Streaming chunk from an LLM response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Text content chunk
    Text {
        text: String,
    },
    /// Partial tool call (for streaming tool arguments)
    ToolCallDelta {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "inputDelta", skip_serializing_if = "Option::is_none")]
        input_delta: Option<String>,
    },
    /// The assistant turn ends in tool use; carries the accumulated call list.
    ///
    /// The list may be empty when the provider signalled tool use without
    /// delivering call details.
    ToolCalls {
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolCall>,
    },
}

impl StreamChunk {
    /// Create a text chunk
    pub fn text(text: impl Into<String>) -> Self {
        StreamChunk::Text { text: text.into() }
    }

    /// Create a tool call list chunk
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        StreamChunk::ToolCalls { tool_calls }
    }
}

/// A complete (non-streamed) assistant reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Accumulated text
    pub text: String,
    /// Whether the provider signalled that the turn ends in tool use
    #[serde(rename = "toolUse", default)]
    pub tool_use: bool,
    /// Requested tool calls, in order
    #[serde(rename = "toolCalls", default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    /// A plain text reply
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Fold a stream chunk into this turn
    pub fn absorb(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Text { text } => self.text.push_str(&text),
            StreamChunk::ToolCallDelta { .. } => {}
            StreamChunk::ToolCalls { tool_calls } => {
                self.tool_use = true;
                self.tool_calls.extend(tool_calls);
            }
        }
    }
}
