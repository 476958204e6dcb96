use crate::traits::ChatMessage;

/// Assembles the message list sent to the model for one turn.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    pub system_prompt: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// The stored conversation: prior history plus the new user message.
    pub fn build_turn(&self, history: &[ChatMessage], current_message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(current_message));
        messages
    }

    /// What the model sees: the system prompt, if any, ahead of the turn.
    pub fn build_request(&self, turn: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turn.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend_from_slice(turn);
        messages
    }
}
