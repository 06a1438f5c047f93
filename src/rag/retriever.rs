use crate::rag::store::{ReviewStore, StoreHit};
use crate::types::{Result, SearchResult};
use crate::utils::toml_config::{RagConfig, ScoreConvention};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Map a store hit to a relevance score under `convention`.
pub fn relevance(hit: &StoreHit, convention: ScoreConvention) -> f32 {
    match convention {
        ScoreConvention::OneMinusDistance => 1.0 - hit.distance,
        ScoreConvention::Similarity => hit.similarity,
    }
}

/// Fixed query policy over a [`ReviewStore`]: top `k`, minimum score.
pub struct Retriever {
    store: Arc<ReviewStore>,
    k: usize,
    score_threshold: f32,
    convention: ScoreConvention,
}

impl Retriever {
    pub fn new(store: Arc<ReviewStore>, k: usize, score_threshold: f32, convention: ScoreConvention) -> Self {
        Self {
            store,
            k,
            score_threshold,
            convention,
        }
    }

    pub fn from_config(store: Arc<ReviewStore>, config: &RagConfig) -> Self {
        Self::new(store, config.k, config.score_threshold, config.score_convention)
    }

    pub fn store(&self) -> &Arc<ReviewStore> {
        &self.store
    }

    /// Up to `k` reviews scoring at least the threshold, best first.
    #[instrument(skip(self), fields(k = self.k, threshold = self.score_threshold))]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let vector = self.store.embed_query(question).await?;
        let hits = self.store.search(&vector, self.k).await?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| SearchResult {
                score: relevance(&hit, self.convention),
                document: hit.document,
            })
            .filter(|r| r.score >= self.score_threshold)
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(self.k);

        debug!(
            count = results.len(),
            ids = ?results.iter().map(|r| r.document.id.as_str()).collect::<Vec<_>>(),
            "Retrieved reviews"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embeddings::MockEmbedder;
    use crate::types::{Document, ReviewMetadata};
    use tempfile::TempDir;
    use vecstore::DistanceMetric;

    fn vector_for(text: &str) -> Vec<f32> {
        match text {
            "crust" | "question about crust" => vec![1.0, 0.0],
            "sauce" => vec![0.8, 0.6],
            "service" => vec![0.0, 1.0],
            _ => vec![-1.0, 0.0],
        }
    }

    fn doc(id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            metadata: ReviewMetadata::new(4.0, "4", "2024-03-03"),
        }
    }

    async fn seeded_store(dir: &TempDir) -> Arc<ReviewStore> {
        let mut mock = MockEmbedder::new();
        mock.expect_embed()
            .returning(|texts| Ok(texts.iter().map(|t| vector_for(t)).collect()));

        let store = ReviewStore::open(dir.path().join("db"), "reviews", DistanceMetric::Cosine, Arc::new(mock))
            .await
            .unwrap();
        store
            .ingest(&[doc("0", "crust"), doc("1", "sauce"), doc("2", "service"), doc("3", "opposite")])
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_k_in_score_order() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(seeded_store(&dir).await, 2, -0.2, ScoreConvention::OneMinusDistance);

        let results = retriever.retrieve("question about crust").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "0");
        assert_eq!(results[1].document.id, "1");
        assert!(results[0].score >= results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_threshold_filters_low_scores() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(seeded_store(&dir).await, 4, 0.5, ScoreConvention::Similarity);

        let results = retriever.retrieve("question about crust").await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert!(results.iter().all(|r| r.score >= 0.5));
    }

    #[tokio::test]
    async fn test_one_minus_distance_allows_negative_scores() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(seeded_store(&dir).await, 4, -0.2, ScoreConvention::OneMinusDistance);

        // Orthogonal scores 0.0 and the opposite review scores -1.0.
        let results = retriever.retrieve("question about crust").await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_nothing_above_threshold_is_empty() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(seeded_store(&dir).await, 2, 1.5, ScoreConvention::Similarity);
        assert!(retriever.retrieve("question about crust").await.unwrap().is_empty());
    }

    #[test]
    fn test_relevance_conventions() {
        let hit = StoreHit {
            document: doc("0", "crust"),
            similarity: 0.25,
            distance: 1.4,
        };
        assert!((relevance(&hit, ScoreConvention::OneMinusDistance) + 0.4).abs() < 1e-6);
        assert_eq!(relevance(&hit, ScoreConvention::Similarity), 0.25);
    }
}
