//! Transport, STT, catalog, stock and TTS capability traits (SPEC_FULL §4.1-§4.3, §4.5-§4.6).

use crate::audio::AudioEncoding;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One inbound media frame from the transport, prior to decode (§4.1).
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
    pub codec: AudioEncoding,
}

/// Terminates a bidirectional media session (C1). Implementers report the
/// negotiated codec at session start and otherwise deal only in encoded bytes;
/// decode/encode is the AudioPipeline's job (C2), not the transport's.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Await the next inbound frame, or `None` once the session has ended.
    async fn recv_frame(&self) -> Option<InboundFrame>;

    /// Write an encoded outbound frame, in submission order.
    async fn send_frame(&self, payload: Vec<u8>) -> Result<()>;

    /// Signal session stop to the remote end.
    async fn stop(&self) -> Result<()>;

    fn codec(&self) -> AudioEncoding;
}

/// A transcript event as produced by STTStream (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

/// Consumes PCM, produces a lazy sequence of transcript events until closed (C3).
#[async_trait]
pub trait SttStream: Send + Sync {
    /// Forward a chunk of decoded PCM audio to the upstream recognizer.
    async fn write_audio(&self, pcm: &[u8]) -> Result<()>;

    /// Await the next transcript event. Returns `None` once the stream is
    /// exhausted (closed and drained). Final transcripts are guaranteed to be
    /// returned in the order the recognizer emitted them (§4.2).
    async fn recv(&self) -> Option<TranscriptEvent>;

    /// Close the stream; any further `recv` calls return `None` within a
    /// bounded interval.
    async fn close(&self) -> Result<()>;
}

/// Product record as served by CatalogIndex (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub key: String,
    pub display_name: String,
    pub category: String,
    pub unit_price: f64,
    pub metadata: serde_json::Value,
}

/// A ranked catalog search hit.
#[derive(Debug, Clone)]
pub struct CatalogMatch {
    pub product: ProductRecord,
    pub score: f32,
}

/// Nearest-neighbor semantic lookup over product embeddings (C4, §4.3).
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    /// Returns at most `k` items with score >= `min_score`, sorted by
    /// descending score, ties broken by product key. Never fails with
    /// "nothing found" — an empty `Vec` is the correct result.
    async fn search(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<CatalogMatch>>;
}

/// Reads/reserves inventory by product key (C5, §4.6).
#[async_trait]
pub trait StockService: Send + Sync {
    /// May be served from a short-TTL cache.
    async fn check_stock(&self, product_key: &str, qty: u32) -> Result<bool>;

    /// Tentative reservation; MUST NOT be served from cache. Fails with
    /// `Error::InsufficientStock` on a reservation race.
    async fn reserve(&self, product_key: &str, qty: u32) -> Result<()>;

    /// Roll back a reservation that will not be finalized into an order.
    async fn release(&self, product_key: &str, qty: u32) -> Result<()>;
}

/// One chunk of synthesized output audio.
pub type AudioChunk = Vec<u8>;

/// Converts a text response into a sequence of output audio chunks (C7, §4.5).
#[async_trait]
pub trait TtsSynthesizer: Send + Sync {
    /// Synthesize `text`. On upstream failure, implementations return the
    /// single pre-recorded fallback chunk described in §4.5 rather than an
    /// error, so the caller is never left in silence.
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioChunk>>;
}
