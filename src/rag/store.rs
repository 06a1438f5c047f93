//! Persistent review store over `vecstore`
//!
//! Reviews are populated at most once per store directory: if the directory
//! exists and has any content, ingestion is skipped without reading the CSV.
//! Changes to the CSV after the first ingestion are not picked up.

use crate::rag::embeddings::{embed_one, Embedder};
use crate::rag::loader::load_reviews;
use crate::types::{AppError, Document, Result, ReviewMetadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use vecstore::{Config, DistanceMetric, MetadataValue, VectorDb, VectorMetadata};

const CONTENT_KEY: &str = "content";
const RATING_KEY: &str = "rating";
const RATING_TEXT_KEY: &str = "rating_text";
const DATE_KEY: &str = "date";

/// What [`ReviewStore::ingest_if_empty`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The store already held data; nothing was read or written
    Skipped,
    Ingested { documents: usize },
}

/// A stored review matched by a query vector.
#[derive(Debug, Clone)]
pub struct StoreHit {
    pub document: Document,
    /// Metric similarity, higher is closer
    pub similarity: f32,
    /// Metric distance, lower is closer
    pub distance: f32,
}

pub struct ReviewStore {
    db: VectorDb,
    path: PathBuf,
    collection: String,
    metric: DistanceMetric,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    unsaved: AtomicBool,
}

/// `true` if `path` is a directory with at least one entry.
pub fn is_populated(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

impl ReviewStore {
    /// Open (or lazily create) the store at `path`.
    pub async fn open(
        path: impl Into<PathBuf>,
        collection: impl Into<String>,
        metric: DistanceMetric,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        Self::open_with_config(Config::persistent(path.into()), collection, metric, embedder).await
    }

    /// Open the store described by `config`, which must name a data path.
    pub async fn open_with_config(
        config: Config,
        collection: impl Into<String>,
        metric: DistanceMetric,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let path = config
            .data_path
            .clone()
            .ok_or_else(|| AppError::Configuration("Review store needs a data path".to_string()))?;
        let db = VectorDb::open(config)
            .await
            .map_err(|e| {
                AppError::VectorStore(format!(
                    "Failed to open review store at {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            db,
            path,
            collection: collection.into(),
            metric,
            embedder,
            batch_size: 32,
            unsaved: AtomicBool::new(false),
        })
    }

    /// Documents embedded per request during ingestion.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn is_populated(&self) -> bool {
        is_populated(&self.path)
    }

    /// Number of stored reviews; zero if nothing was ingested yet.
    pub fn count(&self) -> usize {
        self.db.count(&self.collection).unwrap_or(0)
    }

    /// Load `csv` into the store unless the store directory already has content.
    #[instrument(skip(self), fields(store = %self.path.display()))]
    pub async fn ingest_if_empty(&self, csv: &Path) -> Result<IngestOutcome> {
        if self.is_populated() {
            info!("Review store already populated, skipping ingestion");
            return Ok(IngestOutcome::Skipped);
        }

        let documents = load_reviews(csv)?;
        let documents = self.ingest(&documents).await?;
        Ok(IngestOutcome::Ingested { documents })
    }

    /// Embed and store `documents`, then persist.
    ///
    /// Every document is embedded before the collection is touched, so a
    /// failed embedding leaves the store as it was.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn ingest(&self, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            warn!("No reviews to ingest");
            return Ok(0);
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let embedded = self.embedder.embed(&texts).await.map_err(|e| {
                error!(
                    first_id = %batch[0].id,
                    batch = batch.len(),
                    error = %e,
                    "Failed to embed reviews"
                );
                e
            })?;
            if embedded.len() != batch.len() {
                let e = AppError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                ));
                error!(first_id = %batch[0].id, error = %e, "Embedding count mismatch");
                return Err(e);
            }
            debug!(done = vectors.len() + batch.len(), "Embedded batch");
            vectors.extend(embedded);
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        check_vectors(documents, &vectors, dimensions).map_err(|e| {
            error!(error = %e, "Embedder returned unusable vectors");
            e
        })?;

        let inserted = self.insert_embedded(documents, &vectors, dimensions).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "Failed to store reviews");
            e
        })?;

        info!(inserted, collection = %self.collection, "Ingested reviews");
        Ok(inserted)
    }

    async fn insert_embedded(
        &self,
        documents: &[Document],
        vectors: &[Vec<f32>],
        dimensions: usize,
    ) -> Result<usize> {
        let created = !self.db.collection_exists(&self.collection);
        self.db
            .get_or_create_collection(&self.collection, dimensions, self.metric)
            .await?;

        let entries: Vec<(&str, &[f32], Option<VectorMetadata>)> = documents
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| (doc.id.as_str(), vector.as_slice(), Some(to_metadata(doc))))
            .collect();

        let stored = match self.db.insert_batch(&self.collection, entries).await {
            Ok(inserted) => {
                self.unsaved.store(true, Ordering::Release);
                self.db.persist().await.map(|_| inserted)
            }
            Err(e) => Err(e),
        };
        match stored {
            Ok(inserted) => {
                self.unsaved.store(false, Ordering::Release);
                Ok(inserted)
            }
            Err(e) => {
                if created {
                    // Drop the half-built collection so the next run retries
                    match self.db.delete_collection(&self.collection).await {
                        Ok(()) => self.unsaved.store(false, Ordering::Release),
                        Err(cleanup) => warn!(error = %cleanup, "Failed to remove partial collection"),
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Embed `query` with the store's embedder.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        embed_one(self.embedder.as_ref(), query).await
    }

    /// The `limit` closest reviews to `vector`, best first. An empty store yields no hits.
    #[instrument(skip(self, vector), fields(dim = vector.len()))]
    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<StoreHit>> {
        if !self.db.collection_exists(&self.collection) {
            warn!(collection = %self.collection, "Review collection missing, was ingestion run?");
            return Ok(Vec::new());
        }

        let hits = self.db.search(&self.collection, vector, limit).await?;
        hits.into_iter()
            .map(|hit| {
                let document = from_metadata(&hit.id, hit.metadata.as_ref())?;
                Ok(StoreHit {
                    document,
                    similarity: hit.score,
                    distance: hit.distance,
                })
            })
            .collect()
    }

    /// `true` if vectors were inserted but not yet written to disk.
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    /// Flush everything to disk.
    pub async fn persist(&self) -> Result<()> {
        self.db.persist().await?;
        self.unsaved.store(false, Ordering::Release);
        Ok(())
    }
}

/// Every vector must share one non-zero length and hold only finite values.
fn check_vectors(documents: &[Document], vectors: &[Vec<f32>], dimensions: usize) -> Result<()> {
    if dimensions == 0 {
        return Err(AppError::Embedding("Embedder returned empty vectors".to_string()));
    }
    for (doc, vector) in documents.iter().zip(vectors) {
        if vector.len() != dimensions {
            return Err(AppError::Embedding(format!(
                "Review '{}' embedded to {} dimensions, expected {}",
                doc.id,
                vector.len(),
                dimensions
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Embedding(format!(
                "Review '{}' embedded to a vector with NaN or infinite values",
                doc.id
            )));
        }
    }
    Ok(())
}

fn to_metadata(doc: &Document) -> VectorMetadata {
    VectorMetadata::from_pairs([
        (CONTENT_KEY, MetadataValue::from(doc.content.clone())),
        (RATING_KEY, MetadataValue::from(doc.metadata.rating)),
        (RATING_TEXT_KEY, MetadataValue::from(doc.metadata.rating_text.clone())),
        (DATE_KEY, MetadataValue::from(doc.metadata.date.clone())),
    ])
}

fn from_metadata(id: &str, metadata: Option<&VectorMetadata>) -> Result<Document> {
    let metadata = metadata
        .ok_or_else(|| AppError::VectorStore(format!("Review '{}' has no stored metadata", id)))?;
    let missing = |key: &str| AppError::VectorStore(format!("Review '{}' is missing '{}'", id, key));

    Ok(Document {
        id: id.to_string(),
        content: metadata
            .get_string(CONTENT_KEY)
            .ok_or_else(|| missing(CONTENT_KEY))?
            .to_string(),
        metadata: {
            let rating = metadata.get_number(RATING_KEY).ok_or_else(|| missing(RATING_KEY))?;
            let rating_text = metadata
                .get_string(RATING_TEXT_KEY)
                .map(str::to_string)
                .unwrap_or_else(|| rating.to_string());
            let date = metadata.get_string(DATE_KEY).ok_or_else(|| missing(DATE_KEY))?;
            ReviewMetadata::new(rating, rating_text, date)
        },
    })
}
