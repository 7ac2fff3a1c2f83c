//! Composition root for the voice agent media server (§6, §9): the axum
//! websocket endpoint that drives a `CallOrchestrator` per connection.

pub mod metrics;
pub mod state;
pub mod transport;
pub mod websocket;

pub use state::AppState;
pub use websocket::media_handler;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("provider construction error: {0}")]
    Provider(String),
}
