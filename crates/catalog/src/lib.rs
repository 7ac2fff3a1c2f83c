//! Product catalog search (C4, §4.3): semantic similarity over product
//! embeddings backed by Qdrant, with a substring-fuzzy fallback.

pub mod embeddings;
pub mod index;
pub mod vector_store;

pub use embeddings::{EmbeddingConfig, SimpleEmbedder};
pub use index::{SemanticCatalogIndex, FUZZY_FALLBACK_SCORE};
pub use vector_store::{Document, SearchFilter, VectorDistance, VectorStore, VectorStoreConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<CatalogError> for voice_agent_core::Error {
    fn from(err: CatalogError) -> Self {
        voice_agent_core::Error::UpstreamUnavailable(err.to_string())
    }
}
