mod common;

use common::{text_response, tool_response, ScriptedLLM};
use parking_lot::Mutex;
use reviewrag::agent::ToolCallRecord;
use reviewrag::types::{AppError, MessageRole};
use reviewrag::{AgentOutcome, ChatSession, ToolAgent, ToolRegistry};
use serde_json::json;
use std::sync::Arc;

const SYSTEM: &str = "You are a helpful assistant.";

fn agent_with(llm: Arc<ScriptedLLM>) -> ToolAgent {
    ToolAgent::new(llm, Arc::new(ToolRegistry::with_arithmetic_tools()), SYSTEM)
}

#[tokio::test]
async fn test_chained_arithmetic_calls() {
    let llm = Arc::new(ScriptedLLM::new(vec![
        tool_response(&[("call_1", "add", json!({"a": 40, "b": 12}))]),
        tool_response(&[("call_2", "multiply", json!({"a": 52, "b": 6}))]),
        text_response("40 + 12 = 52, and 52 * 6 = 312."),
    ]));

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let agent = agent_with(llm.clone()).on_tool(move |record: &ToolCallRecord| {
        sink.lock().push(record.name.clone());
    });

    let run = agent
        .run("Add 40 + 12 and then multiply the result by 6")
        .await
        .unwrap();

    assert_eq!(
        run.outcome,
        AgentOutcome::Answered("40 + 12 = 52, and 52 * 6 = 312.".to_string())
    );
    assert_eq!(run.iterations, 3);
    assert_eq!(run.tool_calls.len(), 2);
    assert_eq!(run.tool_calls[0].result, json!(52));
    assert_eq!(run.tool_calls[1].result, json!(312));
    assert_eq!(*seen.lock(), vec!["add".to_string(), "multiply".to_string()]);

    // system, user, assistant(call), tool, assistant(call), tool, assistant
    let messages = run.transcript.messages();
    assert_eq!(messages.len(), 7);
    assert_eq!(messages[0].role, MessageRole::System);
    assert_eq!(messages[3].role, MessageRole::Tool);
    assert_eq!(messages[3].content, "52");
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(messages[5].content, "312");

    // The second model call already saw the first tool result
    let transcripts = llm.transcripts.lock();
    assert_eq!(transcripts.len(), 3);
    assert_eq!(transcripts[1].len(), 4);
}

#[tokio::test]
async fn test_parallel_calls_in_one_turn() {
    let llm = Arc::new(ScriptedLLM::new(vec![
        tool_response(&[
            ("a", "add", json!({"a": 1, "b": 2})),
            ("b", "subtract", json!({"a": 10, "b": 4})),
        ]),
        text_response("3 and 6"),
    ]));

    let run = agent_with(llm).run("two sums").await.unwrap();

    assert_eq!(run.iterations, 2);
    let results: Vec<_> = run.tool_calls.iter().map(|r| r.result.clone()).collect();
    assert_eq!(results, vec![json!(3), json!(6)]);
    assert_eq!(run.transcript.count_role(MessageRole::Tool), 2);
}

#[tokio::test]
async fn test_gives_up_after_max_iterations() {
    let responses = (0..5)
        .map(|i| {
            let id = format!("call_{}", i);
            tool_response(&[(id.as_str(), "add", json!({"a": i, "b": 1}))])
        })
        .collect();
    let llm = Arc::new(ScriptedLLM::new(responses));

    let run = agent_with(llm.clone())
        .with_max_iterations(3)
        .run("loop forever")
        .await
        .unwrap();

    assert_eq!(run.outcome, AgentOutcome::MaxTurnsExceeded { iterations: 3 });
    assert_eq!(run.tool_calls.len(), 3);
    assert_eq!(llm.calls(), 3);
}

#[tokio::test]
async fn test_unknown_tool_aborts_run() {
    let llm = Arc::new(ScriptedLLM::new(vec![tool_response(&[(
        "call_1",
        "divide",
        json!({"a": 1, "b": 2}),
    )])]));

    let err = agent_with(llm).run("divide please").await.unwrap_err();
    assert!(matches!(err, AppError::Tool(ref msg) if msg.contains("divide")));
}

#[tokio::test]
async fn test_invalid_arguments_abort_run() {
    let llm = Arc::new(ScriptedLLM::new(vec![tool_response(&[(
        "call_1",
        "add",
        json!({"a": "forty", "b": 2}),
    )])]));

    let err = agent_with(llm).run("add words").await.unwrap_err();
    assert!(matches!(err, AppError::Tool(_)));
}

#[tokio::test]
async fn test_chat_session_keeps_history() {
    let llm = Arc::new(ScriptedLLM::new(vec![
        text_response("Hello Ada!"),
        text_response("Your name is Ada."),
    ]));
    let mut session = ChatSession::new(llm.clone(), None);

    assert_eq!(session.send("Hi, I'm Ada").await.unwrap(), "Hello Ada!");
    assert_eq!(session.send("What's my name?").await.unwrap(), "Your name is Ada.");

    assert_eq!(session.transcript().len(), 4);
    let transcripts = llm.transcripts.lock();
    assert_eq!(transcripts[1].len(), 3);
    assert_eq!(transcripts[1][0].content, "Hi, I'm Ada");
}

#[tokio::test]
async fn test_chat_failure_does_not_grow_history() {
    let llm = Arc::new(ScriptedLLM::new(vec![text_response("ok")]));
    let mut session = ChatSession::new(llm, Some("Be brief."));

    session.send("first").await.unwrap();
    let err = session.send("second").await.unwrap_err();

    assert!(matches!(err, AppError::LLM(_)));
    assert_eq!(session.transcript().len(), 3);
    assert_eq!(session.transcript().last().map(|m| m.content.as_str()), Some("ok"));
}
