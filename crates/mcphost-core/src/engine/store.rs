//! Conversation history storage

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::ChatMessage;

/// Holds the history of each conversation by id
pub trait ConversationStore: Send + Sync {
    /// History of `conversation_id`, or `None` if it has never completed a turn
    fn load(&self, conversation_id: &str) -> Option<Vec<ChatMessage>>;

    /// Replace the whole history of `conversation_id`
    fn save(&self, conversation_id: &str, history: Vec<ChatMessage>);
}

/// Process-local store; histories live until the process exits
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known conversations
    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn load(&self, conversation_id: &str) -> Option<Vec<ChatMessage>> {
        self.conversations.read().get(conversation_id).cloned()
    }

    fn save(&self, conversation_id: &str, history: Vec<ChatMessage>) {
        self.conversations
            .write()
            .insert(conversation_id.to_string(), history);
    }
}
