use crate::agent::AgentLoop;
use crate::traits::ChatMessage;

/// Ordered message history for one chat session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one turn and keeps everything it produced, tool output included.
    pub async fn send(&mut self, agent: &AgentLoop, text: &str) -> String {
        let turn = agent.respond(&self.messages, text).await;
        self.messages = turn.messages;
        turn.reply
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
