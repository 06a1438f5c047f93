//! LLM client abstractions and provider selection
//!
//! Two providers are supported:
//! - **Gemini**: hosted REST API, tool calling, SSE streaming, model listing
//! - **Ollama**: local daemon, tool calling, NDJSON streaming, local model listing

use crate::types::{AppError, Message, Result, ToolCall, ToolDefinition};
use crate::utils::toml_config::{AppConfig, ModelSettings, ProviderKind};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// One item of a streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFragment {
    /// A chunk of generated text
    Text(String),
    /// The provider failed mid-stream; nothing follows
    Error(String),
    /// Generation finished normally
    End,
}

/// A fresh, pull-based stream of fragments for one generation.
pub type TextStream = Pin<Box<dyn Stream<Item = StreamFragment> + Send>>;

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send the full transcript, declaring `tools` the model may call.
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LLMResponse>;

    /// Single-turn completion without tools.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.chat(&[Message::user(prompt)], &[]).await?;
        Ok(response.content)
    }

    /// Stream a single-turn completion.
    async fn stream(&self, prompt: &str) -> Result<TextStream>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
}

/// A model advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

/// Providers that can enumerate their models.
#[async_trait]
pub trait ModelLister: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// Sampling options forwarded to Ollama.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaOptions {
    pub temperature: Option<f32>,
    pub num_thread: u32,
    pub num_gpu: u32,
    pub top_k: u32,
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// Gemini REST API
    Gemini {
        api_key: String,
        base_url: String,
        model: String,
        temperature: Option<f32>,
        max_retries: u32,
        timeout: Duration,
    },

    /// Local Ollama daemon
    Ollama {
        base_url: String,
        model: String,
        options: OllamaOptions,
        timeout: Duration,
    },
}

impl Provider {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Configuration`] if a Gemini credential is missing.
    pub fn from_settings(config: &AppConfig, settings: &ModelSettings) -> Result<Self> {
        match settings.provider {
            ProviderKind::Gemini => Ok(Provider::Gemini {
                api_key: config.gemini.api_key().map_err(|e| {
                    AppError::Configuration(format!(
                        "{} (required for Gemini model '{}')",
                        e, settings.model
                    ))
                })?,
                base_url: config.gemini.base_url.clone(),
                model: settings.model.clone(),
                temperature: settings.temperature,
                max_retries: config.gemini.max_retries,
                timeout: Duration::from_secs(config.gemini.timeout_secs),
            }),
            ProviderKind::Ollama => Ok(Provider::Ollama {
                base_url: config.ollama.url.clone(),
                model: settings.model.clone(),
                options: OllamaOptions {
                    temperature: settings.temperature,
                    num_thread: config.ollama.num_thread,
                    num_gpu: config.ollama.num_gpu,
                    top_k: config.ollama.top_k,
                },
                timeout: Duration::from_secs(config.ollama.timeout_secs),
            }),
        }
    }

    /// Create a client instance for this provider
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            Provider::Gemini { .. } => Ok(Arc::new(super::gemini::GeminiClient::from_provider(self)?)),
            Provider::Ollama { .. } => Ok(Arc::new(super::ollama::OllamaClient::from_provider(self)?)),
        }
    }

    /// Create a model lister for this provider
    pub fn create_lister(&self) -> Result<Arc<dyn ModelLister>> {
        match self {
            Provider::Gemini { .. } => Ok(Arc::new(super::gemini::GeminiClient::from_provider(self)?)),
            Provider::Ollama { .. } => Ok(Arc::new(super::ollama::OllamaClient::from_provider(self)?)),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini { .. } => "Gemini",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::Gemini { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Drain a stream into a single string, failing on the first error fragment.
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut out = String::new();
    while let Some(fragment) = stream.next().await {
        match fragment {
            StreamFragment::Text(text) => out.push_str(&text),
            StreamFragment::Error(e) => return Err(AppError::LLM(e)),
            StreamFragment::End => break,
        }
    }
    Ok(out)
}
