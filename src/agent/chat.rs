use crate::llm::LLMClient;
use crate::memory::Transcript;
use crate::types::Result;
use std::sync::Arc;
use tracing::debug;

/// Sentinel that ends an interactive session.
pub const EXIT_COMMAND: &str = "exit";

/// `true` if `input` is the exit sentinel, ignoring case and surrounding whitespace.
pub fn is_exit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(EXIT_COMMAND)
}

/// Plain multi-turn conversation; every call sends the whole history.
pub struct ChatSession {
    client: Arc<dyn LLMClient>,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(client: Arc<dyn LLMClient>, system_prompt: Option<&str>) -> Self {
        let transcript = match system_prompt {
            Some(prompt) => Transcript::with_system(prompt),
            None => Transcript::new(),
        };
        Self { client, transcript }
    }

    /// Send `input` and return the reply. The history only grows if the model answers.
    pub async fn send(&mut self, input: &str) -> Result<String> {
        self.transcript.push_user(input);
        match self.client.chat(self.transcript.messages(), &[]).await {
            Ok(response) => {
                debug!(turns = self.transcript.len(), "Chat reply received");
                self.transcript.push_assistant(&response.content, Vec::new());
                Ok(response.content)
            }
            Err(e) => {
                self.transcript.discard_last();
                Err(e)
            }
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}
