//! Core types and capability traits for the voice agent.
//!
//! This crate provides the foundations every other crate depends on:
//! audio frame/buffer types, the conversation/dialogue-state model, the
//! crate-wide error taxonomy, and the capability traits (`MediaTransport`,
//! `SttStream`, `CatalogIndex`, `StockService`, `LlmExtractor`,
//! `TtsSynthesizer`, `OrderSink`, `DialogueFsm`) that every provider and
//! backend crate implements against.

pub mod audio;
pub mod conversation;
pub mod error;
pub mod traits;

pub use audio::{AudioBuffer, AudioEncoding, AudioFrame, Channels, SampleRate};
pub use conversation::{
    Call, CallStatus, ConversationContext, DialogueState, DialogueTurn, LineStatus,
    OrderDraftItem, TurnRole, Unit, MIN_TURN_RING_CAPACITY,
};
pub use error::{Error, Result};
pub use traits::{
    CallRecorder, CatalogIndex, CatalogMatch, DialogueEffect, DialogueEvent, DialogueFsm,
    ExtractedItem, ExtractionResult, FsmError, InboundFrame, LlmExtractor, MediaTransport,
    OrderRequest, OrderResult, OrderSink, ProductRecord, SttStream, StockService,
    TranscriptEvent, TtsSynthesizer,
};
