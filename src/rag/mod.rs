//! Retrieval-augmented answering over restaurant reviews
//!
//! ```text
//! CSV ──load_reviews──▶ ReviewStore (embed + persist, once)
//! question ──Retriever──▶ format_reviews ──PromptTemplate──▶ LLMClient::stream
//! ```

pub mod embeddings;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod store;

pub use embeddings::{Embedder, OllamaEmbedder};
pub use loader::load_reviews;
pub use pipeline::RagPipeline;
pub use prompt::{format_reviews, PromptTemplate, REVIEW_PROMPT};
pub use retriever::Retriever;
pub use store::{IngestOutcome, ReviewStore};
