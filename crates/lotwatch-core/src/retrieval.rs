//! Similarity retrieval and the relevance gate.
//!
//! ```text
//! query ──▶ QueryEmbedder ──▶ VectorStore::vector_search ──▶ RetrievedDocument[]
//!                                                                │
//!                                                   RelevanceGate::admit
//!                                                                │
//!                                          Some(ranked docs) / None (no match)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::store::VectorStore;

/// Number of passages requested per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Minimum relevance of the best passage for the query to be answered.
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.70;

/// A passage retrieved for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    /// Relevance in `[0, 1]`, higher is better.
    pub relevance_score: f64,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            content: content.into(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
        }
    }
}

/// Returns the `k` passages most similar to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>>;
}

/// Turns query text into an embedding vector.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// [`Retriever`] that embeds the query and searches a [`VectorStore`].
pub struct VectorRetriever {
    embedder: Arc<dyn QueryEmbedder>,
    store: Arc<dyn VectorStore>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn QueryEmbedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let candidates = self.store.vector_search(&query_vec, k).await?;
        Ok(candidates
            .into_iter()
            .map(|c| RetrievedDocument::new(c.content, c.raw_score))
            .collect())
    }
}

/// Accepts or rejects a retrieval result by its best relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceGate {
    min_score: f64,
}

impl RelevanceGate {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    /// Rank `docs` by descending relevance and admit them if the best one
    /// scores at least the threshold.
    ///
    /// Returns `None` for an empty result or a top score below the
    /// threshold (or NaN). Equal scores keep their retrieval order.
    pub fn admit(&self, mut docs: Vec<RetrievedDocument>) -> Option<Vec<RetrievedDocument>> {
        docs.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top = docs.first()?.relevance_score;
        if top.is_nan() || top < self.min_score {
            return None;
        }
        Some(docs)
    }
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RELEVANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn doc(content: &str, score: f64) -> RetrievedDocument {
        RetrievedDocument::new(content, score)
    }

    #[test]
    fn test_gate_rejects_empty() {
        assert_eq!(RelevanceGate::default().admit(Vec::new()), None);
    }

    #[test]
    fn test_gate_rejects_low_top_score() {
        assert_eq!(RelevanceGate::default().admit(vec![doc("a", 0.5)]), None);
        assert_eq!(RelevanceGate::default().admit(vec![doc("a", 0.6999)]), None);
    }

    #[test]
    fn test_gate_threshold_is_inclusive() {
        let admitted = RelevanceGate::default().admit(vec![doc("a", 0.70)]).unwrap();
        assert_eq!(admitted.len(), 1);
    }

    #[test]
    fn test_gate_keeps_low_scoring_tail() {
        let admitted = RelevanceGate::default()
            .admit(vec![doc("weak", 0.2), doc("strong", 0.9)])
            .unwrap();
        assert_eq!(admitted[0].content, "strong");
        assert_eq!(admitted[1].content, "weak");
    }

    #[test]
    fn test_gate_rejects_nan() {
        let nan = RetrievedDocument {
            content: "x".into(),
            relevance_score: f64::NAN,
        };
        assert_eq!(RelevanceGate::default().admit(vec![nan]), None);
    }

    #[test]
    fn test_custom_threshold() {
        let gate = RelevanceGate::new(0.4);
        assert!(gate.admit(vec![doc("a", 0.5)]).is_some());
        assert_eq!(gate.min_score(), 0.4);
    }

    #[test]
    fn test_scores_clamped_into_unit_range() {
        assert_eq!(doc("a", -0.3).relevance_score, 0.0);
        assert_eq!(doc("a", 1.2).relevance_score, 1.0);
    }

    struct AxisEmbedder;

    #[async_trait]
    impl QueryEmbedder for AxisEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(if text.contains("level") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    #[tokio::test]
    async fn test_vector_retriever_embeds_and_searches() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("p1", "Level 3 closes at 10pm.", vec![1.0, 0.0]).unwrap();
        store.insert("p2", "Visitors park on level 1.", vec![0.8, 0.6]).unwrap();
        store.insert("p3", "Gate B is for staff.", vec![-1.0, 0.0]).unwrap();

        let retriever = VectorRetriever::new(Arc::new(AxisEmbedder), store);
        let docs = retriever.retrieve("which level closes?", 3).await.unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].content, "Level 3 closes at 10pm.");
        assert!((docs[0].relevance_score - 1.0).abs() < 1e-6);
        assert!((docs[1].relevance_score - 0.8).abs() < 1e-6);
        assert_eq!(docs[2].relevance_score, 0.0);
    }

    #[tokio::test]
    async fn test_vector_retriever_respects_k() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            store.insert(&format!("p{i}"), "text", vec![1.0, i as f32]).unwrap();
        }
        let retriever = VectorRetriever::new(Arc::new(AxisEmbedder), store);
        assert_eq!(retriever.retrieve("level", 3).await.unwrap().len(), 3);
    }
}
