//! Core types for tool-use conversations
//!
//! This module contains the shared types used by providers, routers and the engine.

mod message;
mod tool;
mod stream;
mod cancellation;

pub use message::{ChatMessage, MessageRole};
pub use tool::{Tool, ToolCall};
pub use stream::{AssistantTurn, StreamChunk};
pub use cancellation::CancellationToken;
