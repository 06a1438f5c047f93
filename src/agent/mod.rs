//! Tool-calling agent loop
//!
//! The loop alternates between asking the model and running the tools it
//! requested:
//!
//! ```text
//! AwaitingModel ──tool calls──▶ AwaitingToolResult(calls) ──results──▶ AwaitingModel
//!       │
//!       └──no tool calls──▶ Answered
//! ```
//!
//! At most `max_iterations` model invocations are made; running out yields
//! [`AgentOutcome::MaxTurnsExceeded`]. A failing tool aborts the loop with
//! [`AppError::Tool`](crate::types::AppError::Tool).

pub mod chat;

use crate::llm::LLMClient;
use crate::memory::Transcript;
use crate::tools::ToolRegistry;
use crate::types::{Result, ToolCall};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub use chat::{is_exit, ChatSession};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Where the loop is between model and tools.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    AwaitingModel,
    AwaitingToolResult(Vec<ToolCall>),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The model replied without requesting tools
    Answered(String),
    /// The model was still calling tools after `iterations` invocations
    MaxTurnsExceeded { iterations: usize },
}

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
    pub duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Model invocations made
    pub iterations: usize,
    pub transcript: Transcript,
}

type ToolCallback = Box<dyn Fn(&ToolCallRecord) + Send + Sync>;

pub struct ToolAgent {
    client: Arc<dyn LLMClient>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: usize,
    on_tool: Option<ToolCallback>,
}

impl ToolAgent {
    pub fn new(client: Arc<dyn LLMClient>, registry: Arc<ToolRegistry>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            registry,
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            on_tool: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Called after each tool finishes, before the model sees the result.
    pub fn on_tool<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ToolCallRecord) + Send + Sync + 'static,
    {
        self.on_tool = Some(Box::new(callback));
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the loop for `prompt` starting from `[system, user]`.
    #[instrument(skip(self, prompt), fields(model = %self.client.model_name(), max_iterations = self.max_iterations))]
    pub async fn run(&self, prompt: &str) -> Result<AgentRun> {
        let tools = self.registry.get_tool_definitions();
        let mut transcript = Transcript::with_system(&self.system_prompt);
        transcript.push_user(prompt);

        let mut records = Vec::new();
        let mut iterations = 0;
        let mut state = AgentState::AwaitingModel;

        loop {
            state = match state {
                AgentState::AwaitingModel => {
                    if iterations >= self.max_iterations {
                        warn!(iterations, "Model still calling tools, giving up");
                        return Ok(AgentRun {
                            outcome: AgentOutcome::MaxTurnsExceeded { iterations },
                            tool_calls: records,
                            iterations,
                            transcript,
                        });
                    }

                    iterations += 1;
                    let response = self.client.chat(transcript.messages(), &tools).await?;
                    debug!(
                        iteration = iterations,
                        tool_calls = response.tool_calls.len(),
                        finish_reason = %response.finish_reason,
                        "Model responded"
                    );
                    transcript.push_assistant(&response.content, response.tool_calls.clone());

                    if response.tool_calls.is_empty() {
                        info!(iterations, tools_used = records.len(), "Agent answered");
                        return Ok(AgentRun {
                            outcome: AgentOutcome::Answered(response.content),
                            tool_calls: records,
                            iterations,
                            transcript,
                        });
                    }
                    AgentState::AwaitingToolResult(response.tool_calls)
                }
                AgentState::AwaitingToolResult(calls) => {
                    for call in &calls {
                        let record = self.execute_tool(call).await?;
                        transcript.push_tool_result(call, record.result.to_string());
                        if let Some(callback) = &self.on_tool {
                            callback(&record);
                        }
                        records.push(record);
                    }
                    AgentState::AwaitingModel
                }
            };
        }
    }

    async fn execute_tool(&self, call: &ToolCall) -> Result<ToolCallRecord> {
        let start = Instant::now();
        let result = self
            .registry
            .execute(&call.name, call.arguments.clone())
            .await
            .map_err(|e| {
                error!(tool = %call.name, id = %call.id, arguments = %call.arguments, error = %e, "Tool call failed");
                e
            })?;

        Ok(ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
