//! LLM-backed item extraction (C6, §4.4): turns a final transcript plus recent
//! dialogue turns into a structured product list via an OpenAI-compatible chat
//! completions endpoint.

pub mod client;
pub mod extractor;

pub use client::{ChatClient, ChatConfig, ChatMessage, ChatRole};
pub use extractor::OpenAiExtractor;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request error: {0}")]
    Request(String),

    #[error("upstream returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

impl From<LlmError> for voice_agent_core::Error {
    fn from(err: LlmError) -> Self {
        voice_agent_core::Error::UpstreamUnavailable(err.to_string())
    }
}
