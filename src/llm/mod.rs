//! LLM Provider Clients and Abstractions
//!
//! - [`LLMClient`] - chat with tool declarations, single-turn streaming
//! - [`ModelLister`] - model enumeration
//! - [`Provider`] - runtime selection between Gemini and Ollama
//!
//! Streams yield [`StreamFragment`]s and always finish with `End` or a single
//! `Error`.

/// Core LLM client trait and streaming types.
pub mod client;
/// Gemini REST API client.
pub mod gemini;
/// Local Ollama daemon client.
pub mod ollama;

pub use client::{
    collect_stream, LLMClient, LLMResponse, ModelInfo, ModelLister, OllamaOptions, Provider,
    StreamFragment, TextStream,
};
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
