//! In-memory [`VectorStore`] for tests and small fixed corpora.
//!
//! Brute-force cosine similarity over every stored passage.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{rank_candidates, PassageCandidate, VectorStore};

struct StoredPassage {
    id: String,
    content: String,
    vector: Vec<f32>,
}

/// Passage store held entirely in memory.
pub struct InMemoryStore {
    passages: RwLock<Vec<StoredPassage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Insert a passage, replacing any existing passage with the same id.
    pub fn insert(&self, id: &str, content: &str, vector: Vec<f32>) -> Result<()> {
        let mut passages = self
            .passages
            .write()
            .map_err(|_| anyhow!("passage store lock poisoned"))?;
        passages.retain(|p| p.id != id);
        passages.push(StoredPassage {
            id: id.to_string(),
            content: content.to_string(),
            vector,
        });
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<PassageCandidate>> {
        let passages = self
            .passages
            .read()
            .map_err(|_| anyhow!("passage store lock poisoned"))?;
        let candidates = passages
            .iter()
            .map(|p| PassageCandidate {
                passage_id: p.id.clone(),
                content: p.content.clone(),
                raw_score: cosine_similarity(query_vec, &p.vector) as f64,
            })
            .collect();
        Ok(rank_candidates(candidates, limit))
    }

    async fn count(&self) -> Result<usize> {
        let passages = self
            .passages
            .read()
            .map_err(|_| anyhow!("passage store lock poisoned"))?;
        Ok(passages.len())
    }
}
