//! Persistence layer for vecstore.
//!
//! On-disk layout under the database root:
//! - `collections.json` - list of collection names, absent when there are none
//! - `{name}/metadata.json` - dimensions and metric
//! - `{name}/vectors.json` - every stored vector with its metadata

use crate::collection::Collection;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::StoredVector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const COLLECTIONS_FILE: &str = "collections.json";
const METADATA_FILE: &str = "metadata.json";
const VECTORS_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMetadata {
    name: String,
    dimensions: usize,
    metric: DistanceMetric,
}

/// Write the list of collection names. An empty list removes the file.
pub(crate) async fn save_collection_names(base_path: &Path, names: &[String]) -> Result<()> {
    let path = base_path.join(COLLECTIONS_FILE);
    if names.is_empty() {
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        return Ok(());
    }

    tokio::fs::create_dir_all(base_path).await?;
    let data = serde_json::to_string_pretty(names)
        .map_err(|e| Error::Persistence(format!("Failed to serialize collections: {}", e)))?;
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Read the list of collection names. A missing file means no collections.
pub(crate) async fn load_collection_names(base_path: &Path) -> Result<Vec<String>> {
    let path = base_path.join(COLLECTIONS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let data = tokio::fs::read_to_string(&path).await?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Persistence(format!("Failed to parse {}: {}", COLLECTIONS_FILE, e)))
}

/// Save a collection's metadata and vectors.
pub async fn save_collection(base_path: &Path, collection: &Collection) -> Result<()> {
    let collection_path = base_path.join(collection.name());
    tokio::fs::create_dir_all(&collection_path).await?;

    let metadata = CollectionMetadata {
        name: collection.name().to_string(),
        dimensions: collection.dimensions(),
        metric: collection.metric(),
    };
    let metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| Error::Persistence(format!("Failed to serialize metadata: {}", e)))?;
    tokio::fs::write(collection_path.join(METADATA_FILE), metadata_json).await?;

    let vectors = collection.export_all();
    let vectors_json = serde_json::to_string(&vectors)
        .map_err(|e| Error::Persistence(format!("Failed to serialize vectors: {}", e)))?;
    tokio::fs::write(collection_path.join(VECTORS_FILE), vectors_json).await?;

    info!(name = collection.name(), count = vectors.len(), path = ?collection_path, "Saved collection");
    Ok(())
}

/// Load a collection from disk.
pub async fn load_collection(base_path: &Path, name: &str, max_vectors: usize) -> Result<Collection> {
    let collection_path = base_path.join(name);
    if !collection_path.exists() {
        return Err(Error::CollectionNotFound(name.to_string()));
    }

    let metadata_json = tokio::fs::read_to_string(collection_path.join(METADATA_FILE)).await?;
    let metadata: CollectionMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| Error::Persistence(format!("Failed to parse metadata: {}", e)))?;

    let collection = Collection::new(metadata.name, metadata.dimensions, metadata.metric)?
        .with_max_vectors(max_vectors);

    let vectors_path = collection_path.join(VECTORS_FILE);
    if vectors_path.exists() {
        let vectors_json = tokio::fs::read_to_string(&vectors_path).await?;
        let vectors: Vec<StoredVector> = serde_json::from_str(&vectors_json)
            .map_err(|e| Error::Persistence(format!("Failed to parse vectors: {}", e)))?;

        let count = collection.insert_batch(
            vectors
                .iter()
                .map(|v| (v.id.as_str(), v.vector.as_slice(), v.metadata.clone())),
        )?;
        debug!(name, count, "Loaded vectors");
    }

    info!(name, dimensions = collection.dimensions(), "Loaded collection");
    Ok(collection)
}
