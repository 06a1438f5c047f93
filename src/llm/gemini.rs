//! Gemini REST client
//!
//! Speaks the `v1beta` Generative Language API directly over `reqwest`:
//! `models/{model}:generateContent` for chat and tool calling,
//! `models/{model}:streamGenerateContent?alt=sse` for streaming, and
//! `models` for listing.

use crate::llm::client::{
    LLMClient, LLMResponse, ModelInfo, ModelLister, Provider, StreamFragment, TextStream,
};
use crate::types::{AppError, Message, MessageRole, Result, ToolCall, ToolDefinition};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MODELS_PAGE_SIZE: u32 = 100;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
        }
    }

    pub fn from_provider(provider: &Provider) -> Result<Self> {
        let Provider::Gemini {
            api_key,
            base_url,
            model,
            temperature,
            max_retries,
            timeout,
        } = provider
        else {
            return Err(AppError::Internal(format!(
                "{} provider cannot build a Gemini client",
                provider.name()
            )));
        };

        let http = reqwest::Client::builder()
            .timeout(*timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            model: model.clone(),
            temperature: *temperature,
            max_retries: *max_retries,
            retry_base_delay: Duration::from_millis(1000),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// First retry waits this long, doubling on each further attempt.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn model_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    /// Send a request, retrying rate limits and server errors up to `max_retries` times.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            let response = build()
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| AppError::LLM(format!("Gemini request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if is_retryable(status) && attempt < self.max_retries {
                let delay = self.backoff_delay(attempt, &response);
                warn!(%status, attempt, ?delay, "Gemini request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(error_from_response(response).await);
        }
    }

    fn backoff_delay(&self, attempt: u32, response: &Response) -> Duration {
        if let Some(secs) = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            return Duration::from_secs(secs);
        }
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    AppError::LLM(format!("Gemini request failed ({}): {}", status, message))
}

// ============= Wire Types =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    /// Set on reasoning summaries, which are not part of the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclarations<'a> {
    function_declarations: &'a [ToolDefinition],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionDeclarations<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListModelsResponse {
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

fn build_request<'a>(
    messages: &[Message],
    tools: &'a [ToolDefinition],
    temperature: Option<f32>,
) -> GenerateContentRequest<'a> {
    let mut system_parts = Vec::new();
    let mut contents: Vec<GeminiContent> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(GeminiPart::text(msg.content.clone())),
            MessageRole::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::text(msg.content.clone())],
            }),
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() || msg.tool_calls.is_empty() {
                    parts.push(GeminiPart::text(msg.content.clone()));
                }
                parts.extend(msg.tool_calls.iter().map(|call| GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        id: None,
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    ..GeminiPart::default()
                }));
                contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts,
                });
            }
            MessageRole::Tool => {
                let part = GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: msg.tool_name.clone().unwrap_or_default(),
                        response: function_response_payload(&msg.content),
                    }),
                    ..GeminiPart::default()
                };

                // Results of parallel calls go back in a single turn
                match contents.last_mut() {
                    Some(last) if is_function_response_turn(last) => last.parts.push(part),
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let tools = if tools.is_empty() {
        Vec::new()
    } else {
        vec![FunctionDeclarations {
            function_declarations: tools,
        }]
    };

    GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        }),
        tools,
        generation_config: temperature.map(|t| GenerationConfig {
            temperature: Some(t),
        }),
    }
}

fn is_function_response_turn(content: &GeminiContent) -> bool {
    content.role.as_deref() == Some("user")
        && !content.parts.is_empty()
        && content.parts.iter().all(|p| p.function_response.is_some())
}

/// Gemini wants an object here; wrap anything else under `result`.
fn function_response_payload(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": content }),
    }
}

fn parse_response(response: GenerateContentResponse) -> Result<LLMResponse> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(AppError::LLM(format!("Gemini returned no answer: {}", reason)));
    };

    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(text) = part.text {
            content.push_str(&text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: call.name,
                arguments: call.args,
            });
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        candidate
            .finish_reason
            .map(|r| r.to_lowercase())
            .unwrap_or_else(|| "stop".to_string())
    } else {
        "tool_calls".to_string()
    };

    Ok(LLMResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

/// Parse one SSE line. `None` for lines that carry no event data.
/// Take the next complete line out of a raw SSE byte buffer.
///
/// Bytes stay buffered until a newline arrives, so a multi-byte character
/// split across network chunks is decoded whole.
fn next_sse_line(buffer: &mut Vec<u8>) -> Option<std::result::Result<String, String>> {
    let pos = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=pos).collect();
    Some(String::from_utf8(line).map_err(|e| format!("Stream event is not valid UTF-8: {}", e)))
}

fn parse_sse_line(line: &str) -> Option<std::result::Result<String, String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(format!("Malformed stream event: {}", e))),
    };
    if let Some(message) = value.get("error").and_then(|e| e["message"].as_str()) {
        return Some(Err(message.to_string()));
    }

    let chunk: GenerateContentResponse = match serde_json::from_value(value) {
        Ok(c) => c,
        Err(e) => return Some(Err(format!("Malformed stream event: {}", e))),
    };
    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| p.text)
        .collect();

    Some(Ok(text))
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LLMResponse> {
        let request = build_request(messages, tools, self.temperature);
        let url = self.model_url("generateContent");
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Gemini generateContent");

        let response = self
            .send_with_retry(|| self.http.post(&url).json(&request))
            .await?;
        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Failed to parse Gemini response: {}", e)))?;

        parse_response(body)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let request = build_request(&[Message::user(prompt)], &[], self.temperature);
        let url = format!("{}?alt=sse", self.model_url("streamGenerateContent"));

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLM(format!("Gemini stream request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let mut bytes = response.bytes_stream();
        let output_stream = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut failed = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield StreamFragment::Error(format!("Gemini stream error: {}", e));
                        failed = true;
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = next_sse_line(&mut buffer) {
                    let line = match line {
                        Ok(l) => l,
                        Err(e) => {
                            yield StreamFragment::Error(e);
                            failed = true;
                            break;
                        }
                    };
                    match parse_sse_line(&line) {
                        Some(Ok(text)) if !text.is_empty() => yield StreamFragment::Text(text),
                        Some(Err(e)) => {
                            yield StreamFragment::Error(e);
                            failed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if failed {
                    break;
                }
            }

            if !failed && !buffer.is_empty() {
                match String::from_utf8(std::mem::take(&mut buffer)) {
                    Ok(rest) => match parse_sse_line(&rest) {
                        Some(Ok(text)) if !text.is_empty() => yield StreamFragment::Text(text),
                        Some(Err(e)) => {
                            yield StreamFragment::Error(e);
                            failed = true;
                        }
                        _ => {}
                    },
                    Err(e) => {
                        yield StreamFragment::Error(format!("Stream event is not valid UTF-8: {}", e));
                        failed = true;
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
impl ModelLister for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self
                .send_with_retry(|| {
                    let mut req = self
                        .http
                        .get(&url)
                        .query(&[("pageSize", MODELS_PAGE_SIZE.to_string())]);
                    if let Some(ref token) = page_token {
                        req = req.query(&[("pageToken", token)]);
                    }
                    req
                })
                .await?;

            let page: ListModelsResponse = response
                .json()
                .await
                .map_err(|e| AppError::LLM(format!("Failed to parse model list: {}", e)))?;
            debug!(count = page.models.len(), "Fetched model page");
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[test]
    fn test_build_request_maps_roles() {
        let tools = vec![ToolDefinition {
            name: "add".to_string(),
            description: "Add two integers".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let add = call("c1", "add", json!({"a": 40, "b": 12}));
        let messages = vec![
            Message::system("be helpful"),
            Message::user("add 40 and 12"),
            Message::assistant_with_tools("", vec![add.clone()]),
            Message::tool_result(&add, "52"),
        ];

        let request = build_request(&messages, &tools, Some(0.7));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert_eq!(value["contents"].as_array().unwrap().len(), 3);
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][1]["role"], "model");
        assert_eq!(value["contents"][1]["parts"][0]["functionCall"]["name"], "add");
        assert_eq!(value["contents"][1]["parts"][0]["functionCall"]["args"]["a"], 40);
        assert_eq!(
            value["contents"][2]["parts"][0]["functionResponse"]["response"]["result"],
            52
        );
        assert_eq!(value["tools"][0]["functionDeclarations"][0]["name"], "add");
        assert!((value["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_tool_results_share_a_turn() {
        let a = call("c1", "add", json!({"a": 1, "b": 2}));
        let b = call("c2", "multiply", json!({"a": 3, "b": 4}));
        let messages = vec![
            Message::user("go"),
            Message::assistant_with_tools("", vec![a.clone(), b.clone()]),
            Message::tool_result(&a, "3"),
            Message::tool_result(&b, "12"),
        ];

        let request = build_request(&messages, &[], None);
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[2].parts.len(), 2);
        assert!(request.system_instruction.is_none());
        assert!(request.generation_config.is_none());
    }

    #[test]
    fn test_parse_response_text_and_calls() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "thinking...", "thought": true},
                    {"text": "Let me add."},
                    {"functionCall": {"name": "add", "args": {"a": 40, "b": 12}}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let response = parse_response(body).unwrap();
        assert_eq!(response.content, "Let me add.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "add");
        assert!(response.tool_calls[0].id.starts_with("call_"));
        assert_eq!(response.finish_reason, "tool_calls");
    }

    #[test]
    fn test_parse_response_blocked() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        let err = parse_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#;
        assert_eq!(parse_sse_line(line), Some(Ok("Hi".to_string())));
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"quota"}}"#),
            Some(Err(msg)) if msg == "quota"
        ));
    }

    #[test]
    fn test_next_sse_line_waits_for_split_character() {
        let bytes = "data: café\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = bytes[..split].to_vec();
        assert_eq!(next_sse_line(&mut buffer), None);

        buffer.extend_from_slice(&bytes[split..]);
        assert_eq!(next_sse_line(&mut buffer), Some(Ok("data: café\n".to_string())));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_next_sse_line_rejects_invalid_utf8() {
        let mut buffer = vec![b'd', 0xFF, b'\n'];
        assert!(matches!(next_sse_line(&mut buffer), Some(Err(_))));
    }

    #[test]
    fn test_function_response_payload() {
        assert_eq!(function_response_payload("52"), json!({"result": 52}));
        assert_eq!(function_response_payload("{\"x\":1}"), json!({"x": 1}));
        assert_eq!(function_response_payload("oops"), json!({"result": "oops"}));
    }
}
