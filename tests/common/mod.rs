//! Shared fakes for integration tests.
//!
//! - [`ScriptedLLM`] replays canned responses and records every transcript it saw
//! - [`HashEmbedder`] maps text to a deterministic bag-of-words vector
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reviewrag::llm::{LLMClient, LLMResponse, StreamFragment, TextStream};
use reviewrag::rag::Embedder;
use reviewrag::types::{AppError, Message, Result, ToolCall, ToolDefinition};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

pub const HASH_DIMENSIONS: usize = 32;

pub struct ScriptedLLM {
    responses: Mutex<VecDeque<LLMResponse>>,
    stream_fragments: Vec<StreamFragment>,
    pub transcripts: Mutex<Vec<Vec<Message>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            stream_fragments: Vec::new(),
            transcripts: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Client whose `stream` yields `fragments` as text, then `End`.
    pub fn streaming(fragments: &[&str]) -> Self {
        let mut llm = Self::new(Vec::new());
        llm.stream_fragments = fragments
            .iter()
            .map(|f| StreamFragment::Text(f.to_string()))
            .chain(std::iter::once(StreamFragment::End))
            .collect();
        llm
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().len()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<LLMResponse> {
        self.transcripts.lock().push(messages.to_vec());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::LLM("scripted responses exhausted".to_string()))
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        self.prompts.lock().push(prompt.to_string());
        Ok(Box::pin(futures::stream::iter(self.stream_fragments.clone())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn text_response(content: &str) -> LLMResponse {
    LLMResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
        finish_reason: "stop".to_string(),
    }
}

pub fn tool_response(calls: &[(&str, &str, serde_json::Value)]) -> LLMResponse {
    LLMResponse {
        content: String::new(),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.clone(),
            })
            .collect(),
        finish_reason: "tool_calls".to_string(),
    }
}

/// Deterministic embedder: each lowercase word adds 1.0 to a hashed slot.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: Mutex<usize>,
}

impl HashEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; HASH_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
            v[(hash % HASH_DIMENSIONS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.calls.lock() += 1;
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::Embedding("embedding model unavailable".to_string()))
    }
}

/// Embedder whose vector length changes after the first batch.
#[derive(Default)]
pub struct ShiftingEmbedder {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl Embedder for ShiftingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut calls = self.calls.lock();
        let dimensions = if *calls == 0 { 2 } else { 3 };
        *calls += 1;
        Ok(texts.iter().map(|_| vec![1.0; dimensions]).collect())
    }
}

pub const REVIEWS_CSV: &str = "\
Title,Date,Rating,Review
Best crust in town,2024-01-05,5,The thin crust was crispy and the cheese perfectly melted
Slow delivery,2024-02-11,2,Pizza arrived cold after an hour of waiting
Vegan heaven,2024-03-20,4.5,Great vegan options with cashew cheese and fresh vegetables
";

/// Write `content` to `reviews.csv` inside `dir`.
pub fn write_csv(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("reviews.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}
