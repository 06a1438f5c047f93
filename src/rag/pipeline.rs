use crate::llm::{collect_stream, LLMClient, TextStream};
use crate::rag::prompt::{format_reviews, PromptTemplate};
use crate::rag::retriever::Retriever;
use crate::types::{Document, Result};
use std::sync::Arc;
use tracing::{info, instrument};

/// Retrieve, assemble, generate.
pub struct RagPipeline {
    retriever: Retriever,
    llm: Arc<dyn LLMClient>,
    template: PromptTemplate,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, llm: Arc<dyn LLMClient>) -> Self {
        Self {
            retriever,
            llm,
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The prompt that would be sent for `question`.
    #[instrument(skip(self))]
    pub async fn prepare(&self, question: &str) -> Result<String> {
        let results = self.retriever.retrieve(question).await?;
        let documents: Vec<Document> = results.into_iter().map(|r| r.document).collect();
        info!(reviews = documents.len(), "Assembled prompt");
        Ok(self.template.render(&format_reviews(&documents), question))
    }

    /// Stream the model's answer to `question`.
    pub async fn answer_stream(&self, question: &str) -> Result<TextStream> {
        let prompt = self.prepare(question).await?;
        self.llm.stream(&prompt).await
    }

    /// Answer `question`, buffering the whole reply.
    pub async fn answer(&self, question: &str) -> Result<String> {
        collect_stream(self.answer_stream(question).await?).await
    }
}
