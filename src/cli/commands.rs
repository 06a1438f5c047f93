//! Subcommand handlers.

use crate::agent::{AgentOutcome, ChatSession, ToolAgent};
use crate::cli::output::Output;
use crate::cli::repl::{Repl, ReplInput};
use crate::context::AppContext;
use crate::llm::StreamFragment;
use crate::rag::{IngestOutcome, RagPipeline, ReviewStore};
use crate::tools::ToolRegistry;
use crate::types::{AppError, Result};
use crate::utils::toml_config::ProviderKind;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufRead;
use tracing::info;

const QUESTION_PROMPT: &str = "Enter a question about the restaurant (or type 'exit' to quit):";

pub async fn agent(
    ctx: &AppContext,
    output: &Output,
    prompt: Option<String>,
    max_iterations: Option<usize>,
) -> Result<()> {
    let config = &ctx.config().agent;
    let prompt = prompt.unwrap_or_else(|| config.default_prompt.clone());
    let colored = output.colored;

    let agent = ToolAgent::new(
        ctx.agent_client()?,
        Arc::new(ToolRegistry::with_arithmetic_tools()),
        config.system_prompt.clone(),
    )
    .with_max_iterations(max_iterations.unwrap_or(config.max_iterations))
    .on_tool(move |record| {
        let out = Output { colored };
        out.tool_call(&record.name, &record.arguments.to_string(), &record.result.to_string());
    });

    output.speaker("You", &prompt);
    let run = agent.run(&prompt).await?;
    match run.outcome {
        AgentOutcome::Answered(answer) => output.speaker("AI", &answer),
        AgentOutcome::MaxTurnsExceeded { iterations } => output.warning(&format!(
            "Stopped after {} model calls without a final answer",
            iterations
        )),
    }
    Ok(())
}

pub async fn chat<R: AsyncBufRead + Unpin>(ctx: &AppContext, output: &Output, repl: &mut Repl<R>) -> Result<()> {
    let mut session = ChatSession::new(ctx.chat_client()?, ctx.config().chat.system_prompt.as_deref());
    output.info(&format!(
        "Chatting with {}. Type 'exit' to quit.",
        ctx.config().chat.model
    ));

    loop {
        match repl.read(output, "You:").await? {
            ReplInput::Quit => break,
            ReplInput::Empty => continue,
            ReplInput::Line(line) => {
                let reply = session.send(&line).await?;
                output.speaker("AI", &reply);
            }
        }
    }

    info!(messages = session.transcript().len(), "Chat ended");
    Ok(())
}

pub async fn ingest(ctx: &AppContext, output: &Output, csv: Option<&Path>) -> Result<()> {
    let store = ctx.review_store().await?;
    let csv = csv.unwrap_or(ctx.config().rag.csv_path.as_path());
    report_ingest(output, &store, store.ingest_if_empty(csv).await?);
    Ok(())
}

fn report_ingest(output: &Output, store: &ReviewStore, outcome: IngestOutcome) {
    match outcome {
        IngestOutcome::Skipped => output.info(&format!(
            "Review store at {} is already populated, skipping ingestion",
            store.path().display()
        )),
        IngestOutcome::Ingested { documents } => output.success(&format!(
            "Ingested {} reviews into {}",
            documents,
            store.path().display()
        )),
    }
}

pub async fn ask<R: AsyncBufRead + Unpin>(
    ctx: &AppContext,
    output: &Output,
    question: Option<String>,
    repl: &mut Repl<R>,
) -> Result<()> {
    // Resolve the generation client before ingestion makes any embedding calls
    let pipeline = ctx.rag_pipeline().await?;
    let store = ctx.review_store().await?;
    report_ingest(output, &store, store.ingest_if_empty(&ctx.config().rag.csv_path).await?);

    if let Some(question) = question {
        return answer(&pipeline, output, &question).await;
    }

    loop {
        match repl.read(output, QUESTION_PROMPT).await? {
            ReplInput::Quit => return Ok(()),
            ReplInput::Empty => output.warning("Please enter a valid question"),
            ReplInput::Line(question) => answer(&pipeline, output, &question).await?,
        }
    }
}

/// Stream one answer to stdout as it is generated.
async fn answer(pipeline: &RagPipeline, output: &Output, question: &str) -> Result<()> {
    info!(question, "Answering question");
    let start = Instant::now();

    let mut stream = pipeline.answer_stream(question).await?;
    while let Some(fragment) = stream.next().await {
        match fragment {
            StreamFragment::Text(text) => output.fragment(&text),
            StreamFragment::Error(e) => {
                println!();
                return Err(AppError::LLM(e));
            }
            StreamFragment::End => break,
        }
    }
    println!();

    info!(elapsed_secs = start.elapsed().as_secs_f64(), "Answer generated");
    Ok(())
}

pub async fn models(ctx: &AppContext, output: &Output, provider: ProviderKind) -> Result<()> {
    let lister = ctx.model_lister(provider)?;
    output.info("Fetching available models...");

    let models = lister.list_models().await?;
    for model in &models {
        output.header(&model.name);
        output.kv("Display Name", &model.display_name);
        output.kv("Description", &model.description);
        output.kv(
            "Supported Generation Methods",
            &model.supported_generation_methods.join(", "),
        );
        output.separator();
    }

    output.success(&format!("{} models", models.len()));
    Ok(())
}
