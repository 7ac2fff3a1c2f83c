//! DialogueStateMachine contract (C8, §4.8).
//!
//! §4.8 describes the machine as a pure `(context, event) -> (context', effects)`
//! function, with the orchestrator (C9) enacting each effect. In practice every
//! branch of the per-utterance handler needs the *result* of calling
//! LLMExtractor/CatalogIndex/StockService before it can decide the next
//! branch (the fragment to emit depends on whether the catalog found a match,
//! whether stock was available, and so on) — the handler is a short-lived saga,
//! not a single reduction. The original system's orchestrator has the same
//! shape: its collecting-state handler calls the extractor and catalog inline
//! rather than staging them as a to-do list for a caller to execute.
//!
//! This trait keeps the spec's effect vocabulary but changes its role: `handle`
//! awaits its injected capability collaborators directly and returns the
//! ordered list of effects that were actually enacted, not a plan for someone
//! else to enact. `OrderSink::create` stays conceptually one step removed —
//! the orchestrator reads `DialogueEffect::OrderCreated` out of the returned
//! list rather than the machine holding a sink handle itself, mirroring how
//! the original still keeps order persistence one call out from dialogue
//! control. Implementations remain unit-testable without a runtime: every
//! collaborator is a trait object, so tests inject in-memory fakes.

use crate::conversation::ConversationContext;
use async_trait::async_trait;
use thiserror::Error;

/// Drives the per-utterance handler. The only event the machine reacts to in
/// this spec is a final transcript; interim transcripts only update
/// `last_transcript` and never reach the machine (§4.9 inbound loop).
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    FinalTranscript { text: String, confidence: f32 },
}

/// One effect the machine produced while handling an event, in emission order.
#[derive(Debug, Clone)]
pub enum DialogueEffect {
    /// An assistant utterance ready for the TTS/outbound loop (§4.9).
    UtteranceEmitted(String),
    /// Escalation fired; the call is headed to `Transferring`.
    TransferRequested { reason: String },
    /// `OrderSink::create` succeeded; the call is headed to `Completed`.
    OrderCreated {
        order_id: String,
        requires_human_review: bool,
    },
    /// `OrderSink::create` failed; the call is headed to `Error`.
    OrderFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum FsmError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Capability(#[from] crate::error::Error),
}

/// The per-utterance handler named in §4.8. One implementation per process;
/// wired with concrete LLMExtractor/CatalogIndex/StockService/OrderSink
/// instances at orchestrator construction time.
#[async_trait]
pub trait DialogueFsm: Send + Sync {
    async fn handle(
        &self,
        context: &mut ConversationContext,
        event: DialogueEvent,
    ) -> Result<Vec<DialogueEffect>, FsmError>;
}
