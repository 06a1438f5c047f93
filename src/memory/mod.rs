//! In-memory conversation transcripts.
//!
//! A [`Transcript`] is append-only and lives only as long as the session that
//! owns it; nothing is written to disk.

use crate::types::{Message, MessageRole, ToolCall};

/// Ordered message history for one session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript opened by a system prompt.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.push(Message::system(prompt));
        transcript
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.push(Message::assistant_with_tools(content, tool_calls));
    }

    /// Record the output of `call`.
    pub fn push_tool_result(&mut self, call: &ToolCall, content: impl Into<String>) {
        self.push(Message::tool_result(call, content));
    }

    /// Drop a message that never got an answer.
    pub(crate) fn discard_last(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages with `role`.
    pub fn count_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
