//! LLMExtractor capability trait (C6, §4.4).

use crate::conversation::DialogueTurn;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One product line detected in a caller utterance, before catalog matching.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExtractedItem {
    pub name: String,
    /// Defaults to 1 if unstated (enforced by the extractor, §4.4).
    pub quantity: i64,
    /// Defaults to "boxes" if unstated.
    pub unit: String,
}

/// Always a valid object, even when nothing was detected (§4.4).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ExtractionResult {
    pub items: Vec<ExtractedItem>,
}

/// Converts a final transcript plus recent dialogue into a structured item list (C6).
///
/// Implementations MUST NOT fail this call on provider error or malformed
/// output: §4.4 requires an empty `items` array in that case, handled by the
/// orchestrator as a re-prompt rather than a fatal error.
#[async_trait]
pub trait LlmExtractor: Send + Sync {
    async fn extract(&self, final_transcript: &str, recent_turns: &[DialogueTurn]) -> Result<ExtractionResult>;
}
