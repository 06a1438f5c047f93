//! # reviewrag
//!
//! A small LLM toolkit built around three flows:
//!
//! 1. **Tool-calling agent** - a model answers with the help of `add`,
//!    `subtract` and `multiply`, looping until it stops requesting tools
//! 2. **Chat** - a plain multi-turn conversation kept in memory
//! 3. **Review RAG** - restaurant reviews from a CSV are embedded once into a
//!    local vector store; questions retrieve the closest reviews and stream an
//!    answer grounded in them
//!
//! Gemini (REST) and Ollama (local daemon) are both supported as generation
//! backends; embeddings come from Ollama.
//!
//! ## Library usage
//!
//! ```rust,ignore
//! use reviewrag::{AppConfig, AppContext, ToolAgent, ToolRegistry};
//! use std::sync::Arc;
//!
//! let ctx = AppContext::new(AppConfig::load_or_default("reviewrag.toml")?);
//! let agent = ToolAgent::new(
//!     ctx.agent_client()?,
//!     Arc::new(ToolRegistry::with_arithmetic_tools()),
//!     "You are a helpful assistant.",
//! );
//! let run = agent.run("Add 40 + 12 and then multiply the result by 6").await?;
//! ```
//!
//! ```rust,ignore
//! let pipeline = ctx.rag_pipeline().await?;
//! let answer = pipeline.answer("How is the crust?").await?;
//! ```
//!
//! ## Modules
//!
//! - [`agent`] - tool-calling loop and chat session
//! - [`llm`] - Gemini and Ollama clients
//! - [`rag`] - loading, storing, retrieving and prompting over reviews
//! - [`tools`] - tool trait, registry and arithmetic tools
//! - [`utils`] - TOML configuration

/// Tool-calling agent loop and chat session.
pub mod agent;
/// Command-line interface.
pub mod cli;
/// Process-wide handles built from configuration.
pub mod context;
/// LLM client implementations.
pub mod llm;
/// In-memory conversation transcripts.
pub mod memory;
/// Retrieval-augmented answering over reviews.
pub mod rag;
/// Tools callable by the agent.
pub mod tools;
/// Core types and errors.
pub mod types;
/// Configuration utilities.
pub mod utils;

pub use agent::{AgentOutcome, ChatSession, ToolAgent};
pub use context::AppContext;
pub use llm::{LLMClient, LLMResponse, Provider, StreamFragment};
pub use rag::{RagPipeline, Retriever, ReviewStore};
pub use tools::{Tool, ToolRegistry};
pub use types::{AppError, Result};
pub use utils::toml_config::{AppConfig, LoggingConfig};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `config.level`;
/// `verbose` raises the fallback to `debug`. Logs go to stderr.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}
