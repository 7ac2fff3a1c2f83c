//! Adapter-local error taxonomy, bridged into `voice_agent_core::Error` at the
//! crate boundary (the pattern `voice-agent-llm`/`voice-agent-catalog` use).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("schema setup error: {0}")]
    SchemaError(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid row data: {0}")]
    InvalidData(String),

    #[error("insufficient stock for {product_key}: requested {requested}, available {available}")]
    InsufficientStock {
        product_key: String,
        requested: u32,
        available: u32,
    },
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<PersistenceError> for voice_agent_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => voice_agent_core::Error::NotFound(what),
            PersistenceError::InsufficientStock {
                product_key,
                requested,
                available,
            } => voice_agent_core::Error::InsufficientStock {
                product_key,
                requested,
                available,
            },
            other => voice_agent_core::Error::UpstreamUnavailable(other.to_string()),
        }
    }
}
