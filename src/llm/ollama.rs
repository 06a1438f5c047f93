use crate::llm::client::{
    LLMClient, LLMResponse, ModelInfo, ModelLister, OllamaOptions, Provider, StreamFragment,
    TextStream,
};
use crate::types::{AppError, Message, MessageRole, Result, ToolCall, ToolDefinition};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    http: reqwest::Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
}

/// Split `scheme://host[:port][/...]` into the `scheme://host` part and the port.
pub(crate) fn split_base_url(base_url: &str) -> (String, u16) {
    let (scheme, rest) = base_url
        .split_once("://")
        .unwrap_or(("http", base_url));
    let authority = rest.split('/').next().unwrap_or(rest);

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(DEFAULT_PORT)),
        None => (authority, DEFAULT_PORT),
    };
    let host = if host.is_empty() { "localhost" } else { host };

    (format!("{}://{}", scheme, host), port)
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, options: OllamaOptions) -> Result<Self> {
        Self::with_timeout(base_url, model, options, Duration::from_secs(120))
    }

    fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        options: OllamaOptions,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let (host, port) = split_base_url(&base_url);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Ollama::new(host, port),
            http,
            base_url,
            model: model.into(),
            options,
        })
    }

    pub fn from_provider(provider: &Provider) -> Result<Self> {
        match provider {
            Provider::Ollama {
                base_url,
                model,
                options,
                timeout,
            } => Self::with_timeout(base_url.clone(), model.clone(), options.clone(), *timeout),
            other => Err(AppError::Internal(format!(
                "{} provider cannot build an Ollama client",
                other.name()
            ))),
        }
    }

    fn model_options(&self) -> ModelOptions {
        let mut options = ModelOptions::default()
            .top_k(self.options.top_k)
            .num_thread(self.options.num_thread)
            .num_gpu(self.options.num_gpu);
        if let Some(t) = self.options.temperature {
            options = options.temperature(t);
        }
        options
    }

    fn options_json(&self) -> Value {
        let mut options = json!({
            "top_k": self.options.top_k,
            "num_thread": self.options.num_thread,
            "num_gpu": self.options.num_gpu,
        });
        if let Some(t) = self.options.temperature {
            options["temperature"] = json!(t);
        }
        options
    }
}

fn messages_to_json(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": msg.content,
                    "tool_calls": tool_calls
                })
            }
            MessageRole::Tool => json!({
                "role": "tool",
                "content": msg.content,
                "tool_name": msg.tool_name,
            }),
            role => json!({
                "role": role.to_string(),
                "content": msg.content
            }),
        })
        .collect()
}

fn tools_to_json(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                }
            })
        })
        .collect()
}

fn parse_ollama_response(json: &Value) -> Result<LLMResponse> {
    let message = json
        .get("message")
        .ok_or_else(|| AppError::LLM("No message in Ollama response".into()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(tc_array) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_array {
            let Some(func) = tc.get("function") else {
                continue;
            };
            let name = func
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let arguments = func.get("arguments").cloned().unwrap_or(json!({}));

            tool_calls.push(ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                arguments,
            });
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        "tool_calls".to_string()
    } else {
        json.get("done_reason")
            .and_then(|v| v.as_str())
            .unwrap_or("stop")
            .to_string()
    };

    Ok(LLMResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LLMResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": messages_to_json(messages),
            "stream": false,
            "options": self.options_json(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools_to_json(tools));
        }

        let url = format!("{}/api/chat", self.base_url);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Ollama chat");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLM(format!(
                "Ollama request failed ({}): {}",
                status, text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse Ollama response: {}", e)))?;

        parse_ollama_response(&response_json)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let messages = vec![ChatMessage::user(prompt.to_string())];
        let request =
            ChatMessageRequest::new(self.model.clone(), messages).options(self.model_options());

        let mut stream_response = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| AppError::LLM(format!("Ollama stream error: {}", e)))?;

        let output_stream = stream! {
            let mut failed = false;
            while let Some(chunk_result) = stream_response.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let content = chunk.message.content;
                        if !content.is_empty() {
                            yield StreamFragment::Text(content);
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(_) => {
                        yield StreamFragment::Error("Ollama stream chunk error".to_string());
                        failed = true;
                        break;
                    }
                }
            }
            if !failed {
                yield StreamFragment::End;
            }
        };

        Ok(Box::pin(output_stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelLister for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to list Ollama models: {}", e)))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                display_name: m.name.clone(),
                description: format!(
                    "{:.1} GB, modified {}",
                    m.size as f64 / 1_000_000_000.0,
                    m.modified_at
                ),
                name: m.name,
                supported_generation_methods: vec!["chat".to_string()],
            })
            .collect())
    }
}
