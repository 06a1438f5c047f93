use crate::llm::ollama::split_base_url;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest},
    Ollama,
};
use tracing::{debug, instrument};

/// Turns text into vectors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query string.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .pop()
        .ok_or_else(|| AppError::Embedding("Embedder returned no vector for query".to_string()))
}

/// Embeddings served by a local Ollama daemon.
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        let (host, port) = split_base_url(base_url.trim_end_matches('/'));
        Self {
            client: Ollama::new(host, port),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[instrument(skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let response = self.client.generate_embeddings(request).await.map_err(|e| {
            AppError::Embedding(format!("Ollama embedding with '{}' failed: {}", self.model, e))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings from '{}', got {}",
                texts.len(),
                self.model,
                response.embeddings.len()
            )));
        }

        debug!("Embedded batch");
        Ok(response.embeddings)
    }
}
