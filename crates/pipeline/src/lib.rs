//! Per-call audio pipeline: VAD, the inbound/outbound PCM ring buffer, and the
//! streaming STT and TTS adapters (SPEC_FULL §4.1-§4.2, §4.5).

pub mod audio_pipeline;
pub mod stt;
pub mod tts;
pub mod vad;

pub use audio_pipeline::AudioPipeline;
pub use stt::{SttConfig, WebsocketSttStream};
pub use tts::{ElevenLabsTts, TtsConfig};
pub use vad::{EnergyVad, VadEdge, VadEngine};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unsupported audio codec: {0}")]
    UnsupportedCodec(String),
}

impl From<PipelineError> for voice_agent_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnsupportedCodec(codec) => voice_agent_core::Error::ParseFailure(codec),
        }
    }
}
