//! Passage store abstraction for similarity retrieval.
//!
//! The [`VectorStore`] trait is the read side of the persisted passage
//! index: given a query embedding, return the closest passages. Populating
//! the index happens out-of-band, so the trait carries no write methods;
//! concrete stores expose their own inserts.
//!
//! Implementations must be `Send + Sync` and are shared read-only by all
//! requests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// A passage returned from a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageCandidate {
    /// Stable passage identifier within the store.
    pub passage_id: String,
    /// Full passage text.
    pub content: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub raw_score: f64,
}

/// Read-only similarity search over stored passage embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `limit` passages ordered by descending similarity.
    ///
    /// Equal scores keep the store's internal order.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<PassageCandidate>>;

    /// Number of passages with an embedding.
    async fn count(&self) -> Result<usize>;
}

/// Sort candidates by descending score (stable) and keep the first `limit`.
pub fn rank_candidates(mut candidates: Vec<PassageCandidate>, limit: usize) -> Vec<PassageCandidate> {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit);
    candidates
}
