//! Capability traits for the voice agent's external collaborators (SPEC_FULL §6).
//!
//! Each provider satisfies a narrow capability set rather than a common base class:
//! no inheritance chain, one trait per concern (transport, STT, catalog, stock, LLM
//! extraction, TTS, order sink). Implementers live in their own crates; this crate
//! only names the contract.

mod call_recorder;
mod fsm;
mod llm_extractor;
mod media;
mod order_sink;

pub use call_recorder::CallRecorder;
pub use fsm::{DialogueEffect, DialogueEvent, DialogueFsm, FsmError};
pub use llm_extractor::{ExtractedItem, ExtractionResult, LlmExtractor};
pub use media::{
    CatalogIndex, CatalogMatch, InboundFrame, MediaTransport, ProductRecord, SttStream,
    StockService, TranscriptEvent, TtsSynthesizer,
};
pub use order_sink::{OrderRequest, OrderResult, OrderSink};
