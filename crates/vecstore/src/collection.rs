//! Vector collection.
//!
//! A collection is a named container for vectors with a fixed dimensionality
//! and distance metric. Search is an exact scan over every stored vector,
//! which is plenty for the few thousand documents this store is meant for.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::{SearchResult, StoredVector, VectorMetadata};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A named collection of vectors.
pub struct Collection {
    name: String,
    dimensions: usize,
    metric: DistanceMetric,
    max_vectors: usize,
    inner: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    vectors: Vec<StoredVector>,
    /// id -> position in `vectors`
    positions: HashMap<String, usize>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(name: String, dimensions: usize, metric: DistanceMetric) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidVector(
                "collection dimensions must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            name,
            dimensions,
            metric,
            max_vectors: 0,
            inner: RwLock::new(Entries::default()),
        })
    }

    /// Cap the number of vectors this collection accepts (0 = unlimited).
    pub fn with_max_vectors(mut self, max: usize) -> Self {
        self.max_vectors = max;
        self
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of vectors in the collection.
    pub fn len(&self) -> usize {
        self.inner.read().vectors.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a vector, replacing any existing vector with the same id.
    pub fn insert(&self, id: &str, vector: &[f32], metadata: Option<VectorMetadata>) -> Result<()> {
        self.validate(vector)?;
        let mut entries = self.inner.write();
        self.upsert_locked(&mut entries, id, vector, metadata)
    }

    /// Insert multiple vectors. Every vector is validated before any is stored.
    pub fn insert_batch<'a, I>(&self, vectors: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32], Option<VectorMetadata>)>,
    {
        let batch: Vec<_> = vectors.into_iter().collect();
        for (_, vector, _) in &batch {
            self.validate(vector)?;
        }

        let mut entries = self.inner.write();
        let count = batch.len();
        for (id, vector, metadata) in batch {
            self.upsert_locked(&mut entries, id, vector, metadata)?;
        }
        Ok(count)
    }

    /// Delete a vector. Returns `true` if it existed.
    pub fn delete(&self, id: &str) -> bool {
        let mut entries = self.inner.write();
        let Some(pos) = entries.positions.remove(id) else {
            return false;
        };

        entries.vectors.swap_remove(pos);
        if let Some(moved) = entries.vectors.get(pos) {
            let moved_id = moved.id.clone();
            entries.positions.insert(moved_id, pos);
        }
        true
    }

    /// The `limit` most similar vectors, best first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        self.search_with_threshold(query, limit, f32::NEG_INFINITY)
    }

    /// Like [`Collection::search`], dropping results whose similarity is below `min_score`.
    pub fn search_with_threshold(
        &self,
        query: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        self.validate(query)?;

        let entries = self.inner.read();
        let mut results: Vec<SearchResult> = entries
            .vectors
            .iter()
            .filter_map(|stored| {
                let score = self.metric.similarity(query, &stored.vector);
                (score >= min_score).then(|| SearchResult {
                    id: stored.id.clone(),
                    score,
                    distance: self.metric.distance(query, &stored.vector),
                    metadata: stored.metadata.clone(),
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    /// Get a vector and its metadata by id.
    pub fn get(&self, id: &str) -> Option<(Vec<f32>, Option<VectorMetadata>)> {
        let entries = self.inner.read();
        let pos = *entries.positions.get(id)?;
        let stored = &entries.vectors[pos];
        Some((stored.vector.clone(), stored.metadata.clone()))
    }

    /// Check if a vector exists.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().positions.contains_key(id)
    }

    /// Snapshot of every stored vector, in insertion order.
    pub(crate) fn export_all(&self) -> Vec<StoredVector> {
        self.inner.read().vectors.clone()
    }

    fn validate(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidVector(
                "vector contains NaN or infinite components".to_string(),
            ));
        }
        Ok(())
    }

    fn upsert_locked(
        &self,
        entries: &mut Entries,
        id: &str,
        vector: &[f32],
        metadata: Option<VectorMetadata>,
    ) -> Result<()> {
        let stored = StoredVector {
            id: id.to_string(),
            vector: vector.to_vec(),
            metadata,
        };

        if let Some(&pos) = entries.positions.get(id) {
            entries.vectors[pos] = stored;
            return Ok(());
        }

        if self.max_vectors > 0 && entries.vectors.len() >= self.max_vectors {
            return Err(Error::CapacityExceeded {
                name: self.name.clone(),
                max: self.max_vectors,
            });
        }

        entries.positions.insert(id.to_string(), entries.vectors.len());
        entries.vectors.push(stored);
        Ok(())
    }
}
