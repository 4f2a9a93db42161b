//! Retrieval-augmented question answering.
//!
//! [`RagOrchestrator::answer`] runs one request through a fixed sequence:
//!
//! 1. **Validate**: an empty query is an `InvalidInput` error.
//! 2. **Context decision**: a non-empty caller context is used verbatim
//!    and retrieval is skipped.
//! 3. **Retrieve**: otherwise fetch `top_k` passages and pass them through
//!    the [`RelevanceGate`]. A rejected result ends the request with
//!    [`NO_MATCH_RESPONSE`]; the model is not called.
//! 4. **Assemble**: fill the prompt template with the context and query.
//! 5. **Generate**: one call to the [`Responder`]. Failures become
//!    `Generation` errors; nothing is retried.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ServeError, ServeResult};
use crate::prompt::{assemble_prompt, join_documents};
use crate::retrieval::{RelevanceGate, Retriever, DEFAULT_TOP_K};

/// Returned with HTTP 200 when no stored passage is relevant enough.
pub const NO_MATCH_RESPONSE: &str = "Unable to find matching results in the database.";

/// Body of a RAG query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagRequest {
    #[serde(default)]
    pub query: Option<String>,
    /// Pre-gathered context; when non-empty, retrieval is skipped.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagResponse {
    pub response: String,
}

impl RagResponse {
    fn no_match() -> Self {
        Self {
            response: NO_MATCH_RESPONSE.to_string(),
        }
    }
}

/// Generates free text from a fully assembled prompt.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RagParams {
    pub top_k: usize,
    pub gate: RelevanceGate,
}

impl Default for RagParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            gate: RelevanceGate::default(),
        }
    }
}

/// Sequences retrieval, gating, prompt assembly and generation.
pub struct RagOrchestrator {
    retriever: Arc<dyn Retriever>,
    responder: Arc<dyn Responder>,
    params: RagParams,
}

impl RagOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        responder: Arc<dyn Responder>,
        params: RagParams,
    ) -> Self {
        Self {
            retriever,
            responder,
            params,
        }
    }

    pub async fn answer_request(&self, req: &RagRequest) -> ServeResult<RagResponse> {
        self.answer(req.query.as_deref().unwrap_or(""), req.context.as_deref())
            .await
    }

    /// Answer `query`, grounding on `context` if given or on retrieved passages.
    pub async fn answer(&self, query: &str, context: Option<&str>) -> ServeResult<RagResponse> {
        if query.is_empty() {
            return Err(ServeError::invalid_input("Query text is missing."));
        }

        let context_text = match context.filter(|c| !c.is_empty()) {
            Some(supplied) => {
                tracing::debug!(chars = supplied.len(), "using caller-supplied context");
                supplied.to_string()
            }
            None => {
                let docs = self
                    .retriever
                    .retrieve(query, self.params.top_k)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "similarity search failed");
                        ServeError::generation("failed to search the passage store")
                    })?;
                let retrieved = docs.len();
                let top_score = docs.iter().map(|d| d.relevance_score).fold(0.0, f64::max);

                match self.params.gate.admit(docs) {
                    Some(admitted) => {
                        tracing::debug!(retrieved, top_score, "retrieval passed relevance gate");
                        join_documents(&admitted)
                    }
                    None => {
                        tracing::info!(
                            retrieved,
                            top_score,
                            threshold = self.params.gate.min_score(),
                            "no passage cleared the relevance gate"
                        );
                        return Ok(RagResponse::no_match());
                    }
                }
            }
        };

        let prompt = assemble_prompt(&context_text, query);

        let started = Instant::now();
        let text = self.responder.generate(&prompt).await.map_err(|e| {
            tracing::error!(error = %e, "generative model call failed");
            ServeError::generation("failed to generate a response")
        })?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );

        if text.trim().is_empty() {
            tracing::error!("generative model returned an empty response");
            return Err(ServeError::generation("failed to generate a response"));
        }

        Ok(RagResponse { response: text })
    }
}
