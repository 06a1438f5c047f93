//! Gemini client against a mock Generative Language API.

use futures::StreamExt;
use reviewrag::llm::gemini::GeminiClient;
use reviewrag::llm::{collect_stream, LLMClient, ModelLister, Provider, StreamFragment};
use reviewrag::types::{AppError, Message};
use reviewrag::utils::toml_config::{AppConfig, GeminiConfig};
use reviewrag::{AgentOutcome, ToolAgent, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-2.5-flash";
const GENERATE_PATH: &str = "/models/gemini-2.5-flash:generateContent";

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key", MODEL)
        .with_base_url(server.uri())
        .with_retry_base_delay(Duration::from_millis(1))
}

fn text_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn call_body(name: &str, args: serde_json::Value) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_chat_sends_key_and_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Be helpful."}]},
            "contents": [{"role": "user", "parts": [{"text": "Hi"}]}],
            "tools": [{"functionDeclarations": [{"name": "add"}, {"name": "multiply"}, {"name": "subtract"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello!")))
        .expect(1)
        .mount(&server)
        .await;

    let tools = ToolRegistry::with_arithmetic_tools().get_tool_definitions();
    let response = client(&server)
        .chat(&[Message::system("Be helpful."), Message::user("Hi")], &tools)
        .await
        .unwrap();

    assert_eq!(response.content, "Hello!");
    assert!(response.tool_calls.is_empty());
    assert_eq!(response.finish_reason, "stop");
}

#[tokio::test]
async fn test_chat_parses_function_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("add", json!({"a": 40, "b": 12}))))
        .mount(&server)
        .await;

    let response = client(&server).chat(&[Message::user("40+12?")], &[]).await.unwrap();

    assert_eq!(response.finish_reason, "tool_calls");
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "add");
    assert_eq!(response.tool_calls[0].arguments, json!({"a": 40, "b": 12}));
    assert!(!response.tool_calls[0].id.is_empty());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource exhausted"}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("after retry")))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).chat(&[Message::user("Hi")], &[]).await.unwrap();
    assert_eq!(response.content, "after retry");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .with_max_retries(2)
        .chat(&[Message::user("Hi")], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LLM(ref msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).chat(&[Message::user("Hi")], &[]).await.unwrap_err();
    assert!(matches!(err, AppError::LLM(ref msg) if msg.contains("API key not valid")));
}

#[tokio::test]
async fn test_stream_yields_sse_text() {
    let server = MockServer::start().await;
    let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The crust \"}]}}]}\r\n\r\n\
               data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"is great.\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n";
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let fragments: Vec<StreamFragment> = client(&server).stream("How is the crust?").await.unwrap().collect().await;
    assert_eq!(
        fragments,
        vec![
            StreamFragment::Text("The crust ".to_string()),
            StreamFragment::Text("is great.".to_string()),
            StreamFragment::End,
        ]
    );
}

#[tokio::test]
async fn test_stream_error_event_surfaces() {
    let server = MockServer::start().await;
    let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n\n\
               data: {\"error\":{\"code\":500,\"message\":\"internal\"}}\n\n";
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let err = collect_stream(client(&server).stream("q").await.unwrap()).await.unwrap_err();
    assert!(matches!(err, AppError::LLM(ref msg) if msg.contains("internal")));
}

/// Serve one chunked SSE response whose chunks are written separately.
async fn serve_chunked_once(chunks: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        for chunk in chunks {
            socket.write_all(format!("{:x}\r\n", chunk.len()).as_bytes()).await.unwrap();
            socket.write_all(&chunk).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.flush().await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_stream_keeps_character_split_across_chunks() {
    let event = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"café\"}]}}]}\n\n".as_bytes();
    let split = event.iter().position(|&b| b == 0xC3).unwrap() + 1;
    let base_url = serve_chunked_once(vec![event[..split].to_vec(), event[split..].to_vec()]).await;

    let client = GeminiClient::new("test-key", MODEL).with_base_url(base_url);
    let text = collect_stream(client.stream("hi").await.unwrap()).await.unwrap();

    assert_eq!(text, "café");
}

#[tokio::test]
async fn test_list_models_follows_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{
                "name": "models/gemini-2.5-pro",
                "displayName": "Gemini 2.5 Pro",
                "description": "Most capable",
                "supportedGenerationMethods": ["generateContent"]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{
                "name": "models/gemini-2.5-flash",
                "displayName": "Gemini 2.5 Flash",
                "description": "Fast and versatile",
                "supportedGenerationMethods": ["generateContent", "countTokens"]
            }],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;

    let models = client(&server).list_models().await.unwrap();

    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["models/gemini-2.5-flash", "models/gemini-2.5-pro"]);
    assert_eq!(models[0].display_name, "Gemini 2.5 Flash");
    assert_eq!(
        models[0].supported_generation_methods,
        vec!["generateContent".to_string(), "countTokens".to_string()]
    );
}

#[tokio::test]
async fn test_agent_loop_over_gemini() {
    let server = MockServer::start().await;
    // Third turn: both results are in the history
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user"},
                {"role": "model", "parts": [{"functionCall": {"name": "add"}}]},
                {"role": "user", "parts": [{"functionResponse": {"name": "add", "response": {"result": 52}}}]},
                {"role": "model", "parts": [{"functionCall": {"name": "multiply"}}]},
                {"role": "user", "parts": [{"functionResponse": {"name": "multiply", "response": {"result": 312}}}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("The result is 312.")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user"},
                {"role": "model"},
                {"role": "user", "parts": [{"functionResponse": {"name": "add"}}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("multiply", json!({"a": 52, "b": 6}))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("add", json!({"a": 40, "b": 12}))))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let agent = ToolAgent::new(
        Arc::new(client(&server)),
        Arc::new(ToolRegistry::with_arithmetic_tools()),
        "You are a helpful assistant.",
    );
    let run = agent
        .run("Add 40 + 12 and then multiply the result by 6")
        .await
        .unwrap();

    assert_eq!(run.outcome, AgentOutcome::Answered("The result is 312.".to_string()));
    assert_eq!(run.iterations, 3);
    let tools: Vec<&str> = run.tool_calls.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(tools, vec!["add", "multiply"]);
}

#[test]
fn test_missing_key_is_configuration_error() {
    let config = AppConfig {
        gemini: GeminiConfig {
            api_key_env: "REVIEWRAG_IT_UNSET_KEY_A".to_string(),
            fallback_api_key_env: "REVIEWRAG_IT_UNSET_KEY_B".to_string(),
            ..GeminiConfig::default()
        },
        ..AppConfig::default()
    };

    let err = Provider::from_settings(&config, &config.agent.model_settings()).unwrap_err();
    assert!(matches!(err, AppError::Configuration(ref msg) if msg.contains("REVIEWRAG_IT_UNSET_KEY_A")));
}
