//! Conversation engine
//!
//! Runs user turns through the bounded tool-call round loop, with buffered
//! (`chat`) or streamed (`stream_chat`) delivery. Per turn the event order is:
//!
//! ```text
//! delta*  (start_tool_call (tool_call tool_result)+ delta*)*  done
//! ```

mod conversation;
mod error;
mod events;
mod store;

pub use conversation::{ConversationEngine, EngineOptions, TurnOutcome, DEFAULT_MAX_ROUNDS};
pub use error::{EngineError, EngineResult};
pub use events::{ChannelSink, ChatEvent, DoneReason, EventSink, NullSink, SinkError, VecSink};
pub use store::{ConversationStore, MemoryConversationStore};
