//! # lotwatch core
//!
//! I/O-free serving logic for lotwatch: calendar features and tree-ensemble
//! forecasting, similarity retrieval with a relevance gate, prompt
//! assembly, RAG orchestration, and keyword-driven query translation.
//!
//! Network clients, SQLite, configuration and HTTP live in the `lotwatch`
//! app crate, which plugs concrete implementations into the traits here:
//!
//! | Trait | Role | App implementation |
//! |-------|------|--------------------|
//! | [`forecast::Regressor`] | vehicle-count model | [`gbtree::GradientBoostedTrees`] |
//! | [`retrieval::QueryEmbedder`] | query → vector | Ollama / OpenAI embeddings |
//! | [`store::VectorStore`] | passage similarity search | SQLite passage table |
//! | [`retrieval::Retriever`] | query → ranked passages | [`retrieval::VectorRetriever`] |
//! | [`rag::Responder`] | prompt → answer text | Ollama / OpenAI generation |

pub mod embedding;
pub mod error;
pub mod features;
pub mod forecast;
pub mod gbtree;
pub mod prompt;
pub mod rag;
pub mod retrieval;
pub mod store;
pub mod translate;

pub use error::{ServeError, ServeResult};
