//! Process-wide handles built once from configuration.

use crate::llm::{LLMClient, ModelLister, Provider};
use crate::rag::{Embedder, OllamaEmbedder, RagPipeline, Retriever, ReviewStore};
use crate::types::Result;
use crate::utils::toml_config::{AppConfig, ModelSettings, ProviderKind};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Owns configuration and lazily opened resources. Passed by reference.
pub struct AppContext {
    config: AppConfig,
    store: OnceCell<Arc<ReviewStore>>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn client_for(&self, settings: &ModelSettings) -> Result<Arc<dyn LLMClient>> {
        let provider = Provider::from_settings(&self.config, settings)?;
        debug!(provider = provider.name(), model = provider.model(), "Creating LLM client");
        provider.create_client()
    }

    pub fn agent_client(&self) -> Result<Arc<dyn LLMClient>> {
        self.client_for(&self.config.agent.model_settings())
    }

    pub fn chat_client(&self) -> Result<Arc<dyn LLMClient>> {
        self.client_for(&self.config.chat.model_settings())
    }

    pub fn rag_client(&self) -> Result<Arc<dyn LLMClient>> {
        self.client_for(&self.config.rag.model_settings())
    }

    /// Lister for `provider`; the agent model only fills the provider's required model slot.
    pub fn model_lister(&self, provider: ProviderKind) -> Result<Arc<dyn ModelLister>> {
        let settings = ModelSettings {
            provider,
            model: self.config.agent.model.clone(),
            temperature: None,
        };
        Provider::from_settings(&self.config, &settings)?.create_lister()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::new(OllamaEmbedder::new(
            &self.config.ollama.url,
            self.config.rag.embedding_model.clone(),
        ))
    }

    /// The review store, opened on first use.
    pub async fn review_store(&self) -> Result<Arc<ReviewStore>> {
        self.store
            .get_or_try_init(|| async {
                let rag = &self.config.rag;
                let store = ReviewStore::open(&rag.db_path, rag.collection.clone(), rag.metric()?, self.embedder())
                    .await?
                    .with_batch_size(rag.embed_batch_size);
                info!(path = %rag.db_path.display(), collection = %rag.collection, "Opened review store");
                Ok::<_, crate::types::AppError>(Arc::new(store))
            })
            .await
            .cloned()
    }

    pub async fn rag_pipeline(&self) -> Result<RagPipeline> {
        let client = self.rag_client()?;
        let store = self.review_store().await?;
        let retriever = Retriever::from_config(store, &self.config.rag);
        Ok(RagPipeline::new(retriever, client))
    }

    /// Flush the review store if it holds changes not yet on disk.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(store) = self.store.get() {
            if store.has_unsaved_changes() {
                store.persist().await?;
            }
        }
        debug!("Context shut down");
        Ok(())
    }
}
