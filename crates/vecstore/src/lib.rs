//! # vecstore
//!
//! A small embedded vector store with exact similarity search and JSON
//! persistence. Each collection holds vectors of one dimensionality along
//! with optional key-value metadata.
//!
//! ```rust,ignore
//! use vecstore::{Config, DistanceMetric, VectorDb};
//!
//! let db = VectorDb::open(Config::persistent("./reviews_db")).await?;
//! db.get_or_create_collection("restaurant_reviews", 768, DistanceMetric::Cosine).await?;
//! db.insert("restaurant_reviews", "0", &embedding, None).await?;
//! db.persist().await?;
//!
//! let hits = db.search("restaurant_reviews", &query, 2).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod distance;
pub mod error;
pub mod persistence;
pub mod types;

pub use collection::Collection;
pub use config::Config;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use types::{MetadataValue, SearchResult, VectorId, VectorMetadata};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The vector database handle. Cheap to clone.
#[derive(Clone)]
pub struct VectorDb {
    inner: Arc<VectorDbInner>,
}

struct VectorDbInner {
    config: Config,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl VectorDb {
    /// Open a database. Persistent databases load every collection listed in
    /// `collections.json`; a collection that fails to load is skipped with a warning.
    #[instrument(skip(config), fields(persistent = config.data_path.is_some()))]
    pub async fn open(config: Config) -> Result<Self> {
        info!("Opening vector database");

        let db = Self {
            inner: Arc::new(VectorDbInner {
                config: config.clone(),
                collections: RwLock::new(HashMap::new()),
            }),
        };

        if let Some(ref path) = config.data_path {
            db.load_collections(path).await?;
        }

        Ok(db)
    }

    /// Create a new collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionExists`] if the name is taken.
    #[instrument(skip(self))]
    pub async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Arc<Collection>> {
        info!(name, dimensions, ?metric, "Creating collection");

        let collection = Arc::new(
            Collection::new(name.to_string(), dimensions, metric)?
                .with_max_vectors(self.inner.config.max_vectors),
        );

        {
            let mut collections = self.inner.collections.write();
            if collections.contains_key(name) {
                return Err(Error::CollectionExists(name.to_string()));
            }
            collections.insert(name.to_string(), collection.clone());
        }

        if let Some(ref path) = self.inner.config.data_path {
            persistence::save_collection_names(path, &self.list_collections()).await?;
        }

        Ok(collection)
    }

    /// Return the named collection, creating it if absent.
    ///
    /// An existing collection with different dimensions is an error.
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Result<Arc<Collection>> {
        if let Ok(existing) = self.get_collection(name) {
            if existing.dimensions() != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: existing.dimensions(),
                    actual: dimensions,
                });
            }
            return Ok(existing);
        }
        self.create_collection(name, dimensions, metric).await
    }

    /// Delete a collection and its files.
    #[instrument(skip(self))]
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        info!(name, "Deleting collection");

        if self.inner.collections.write().remove(name).is_none() {
            return Err(Error::CollectionNotFound(name.to_string()));
        }

        if let Some(ref path) = self.inner.config.data_path {
            let collection_path = path.join(name);
            if collection_path.exists() {
                tokio::fs::remove_dir_all(&collection_path).await?;
            }
            persistence::save_collection_names(path, &self.list_collections()).await?;
        }

        Ok(())
    }

    /// Check if a collection exists.
    pub fn collection_exists(&self, name: &str) -> bool {
        self.inner.collections.read().contains_key(name)
    }

    /// All collection names, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get a handle to a collection.
    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.inner
            .collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    /// Insert a vector into a collection.
    #[instrument(skip(self, vector, metadata), fields(dim = vector.len()))]
    pub async fn insert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        metadata: Option<VectorMetadata>,
    ) -> Result<()> {
        let col = self.get_collection(collection)?;
        col.insert(id, vector, metadata)?;
        debug!("Inserted vector");
        Ok(())
    }

    /// Insert multiple vectors into a collection. Returns how many were stored.
    #[instrument(skip(self, vectors))]
    pub async fn insert_batch<'a, I>(&self, collection: &str, vectors: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32], Option<VectorMetadata>)>,
    {
        let col = self.get_collection(collection)?;
        let count = col.insert_batch(vectors)?;
        debug!(count, "Inserted batch");
        Ok(count)
    }

    /// Delete a vector. Returns `true` if it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let col = self.get_collection(collection)?;
        Ok(col.delete(id))
    }

    /// The `limit` most similar vectors, best first.
    #[instrument(skip(self, query), fields(dim = query.len()))]
    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let col = self.get_collection(collection)?;
        let results = col.search(query, limit)?;
        debug!(count = results.len(), "Search completed");
        Ok(results)
    }

    /// Search keeping only results with similarity `>= min_score`.
    #[instrument(skip(self, query))]
    pub async fn search_with_threshold(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        let col = self.get_collection(collection)?;
        col.search_with_threshold(query, limit, min_score)
    }

    /// Get a vector and its metadata by id.
    pub async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<(Vec<f32>, Option<VectorMetadata>)>> {
        let col = self.get_collection(collection)?;
        Ok(col.get(id))
    }

    /// Number of vectors in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.get_collection(collection)?.len())
    }

    /// Statistics for a collection.
    pub fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        let col = self.get_collection(collection)?;
        Ok(CollectionStats {
            name: col.name().to_string(),
            vector_count: col.len(),
            dimensions: col.dimensions(),
            metric: col.metric(),
        })
    }

    /// Write every collection to disk. A no-op for in-memory databases.
    #[instrument(skip(self))]
    pub async fn persist(&self) -> Result<()> {
        let Some(ref path) = self.inner.config.data_path else {
            debug!("Skipping persist for in-memory database");
            return Ok(());
        };

        info!("Persisting database to disk");

        let to_persist: Vec<Arc<Collection>> =
            self.inner.collections.read().values().cloned().collect();

        persistence::save_collection_names(path, &self.list_collections()).await?;
        for collection in to_persist {
            persistence::save_collection(path, &collection).await?;
        }

        Ok(())
    }

    async fn load_collections(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            tokio::fs::create_dir_all(path).await?;
            return Ok(());
        }

        for name in persistence::load_collection_names(path).await? {
            match persistence::load_collection(path, &name, self.inner.config.max_vectors).await {
                Ok(collection) => {
                    self.inner
                        .collections
                        .write()
                        .insert(name, Arc::new(collection));
                }
                Err(e) => {
                    warn!(name, error = %e, "Failed to load collection, skipping");
                }
            }
        }

        Ok(())
    }
}

/// Statistics about a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    /// Name of the collection.
    pub name: String,
    /// Number of vectors in the collection.
    pub vector_count: usize,
    /// Dimensionality of vectors.
    pub dimensions: usize,
    /// Distance metric used.
    pub metric: DistanceMetric,
}
