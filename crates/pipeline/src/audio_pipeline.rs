//! `AudioPipeline` (C2, §4.1): decodes inbound transport frames into linear
//! PCM, runs VAD on 20ms windows, keeps a bounded drop-oldest buffer sized for
//! ~4s of audio, and encodes outbound PCM back to the transport's codec.

use std::time::Duration;

use parking_lot::Mutex;
use voice_agent_core::{AudioBuffer, AudioEncoding, AudioFrame, Channels, InboundFrame, SampleRate};

use crate::vad::{EnergyVad, VadEdge, VadEngine};
use crate::PipelineError;

/// How much decoded audio the inbound ring buffer holds before it starts
/// dropping the oldest samples (§4.1: "capacity sized for ~4s").
const INBOUND_BUFFER_CAPACITY: Duration = Duration::from_secs(4);

pub struct AudioPipeline {
    sample_rate: SampleRate,
    buffer: Mutex<AudioBuffer>,
    vad: Mutex<Box<dyn VadEngine>>,
    sequence: std::sync::atomic::AtomicU64,
}

impl AudioPipeline {
    pub fn new(sample_rate: SampleRate) -> Self {
        Self::with_vad(sample_rate, Box::new(EnergyVad::default()))
    }

    pub fn with_vad(sample_rate: SampleRate, vad: Box<dyn VadEngine>) -> Self {
        Self {
            sample_rate,
            buffer: Mutex::new(AudioBuffer::new(sample_rate, INBOUND_BUFFER_CAPACITY)),
            vad: Mutex::new(vad),
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Decode one inbound frame, append it to the ring buffer, and run VAD.
    ///
    /// A frame in an unsupported codec is logged and dropped rather than
    /// failing the call (§4.1 failure mode).
    pub fn ingest(&self, frame: &InboundFrame) -> VadEdge {
        let seq = self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let decoded = match frame.codec {
            AudioEncoding::Pcm16 => {
                AudioFrame::from_pcm16(&frame.payload, self.sample_rate, Channels::Mono, seq)
            }
            AudioEncoding::Mulaw => {
                AudioFrame::from_mulaw(&frame.payload, self.sample_rate, Channels::Mono, seq)
            }
            AudioEncoding::Alaw => {
                tracing::warn!("A-law frame received, no decoder configured; dropping");
                return VadEdge::None;
            }
        };

        let edge = self.vad.lock().process_frame(&decoded);
        self.buffer.lock().push(&decoded);
        edge
    }

    /// Drain up to `max_samples` of buffered PCM as little-endian 16-bit bytes,
    /// for forwarding to the STT adapter.
    pub fn drain_pcm16(&self, max_samples: usize) -> Vec<u8> {
        let samples = self.buffer.lock().drain(max_samples);
        samples
            .into_iter()
            .flat_map(|s| {
                let clamped = s.clamp(-1.0, 1.0);
                ((clamped * i16::MAX as f32) as i16).to_le_bytes()
            })
            .collect()
    }

    pub fn buffered_duration(&self) -> Duration {
        self.buffer.lock().duration()
    }

    pub fn is_speaking(&self) -> bool {
        self.vad.lock().is_speaking()
    }

    pub fn reset(&self) {
        self.buffer.lock().clear();
        self.vad.lock().reset();
    }

    /// Encode a chunk of linear PCM16 bytes for the given outbound codec.
    pub fn encode_outbound(&self, pcm16: &[u8], codec: AudioEncoding) -> Result<Vec<u8>, PipelineError> {
        let frame = AudioFrame::from_pcm16(pcm16, self.sample_rate, Channels::Mono, 0);
        match codec {
            AudioEncoding::Pcm16 => Ok(frame.to_pcm16()),
            AudioEncoding::Mulaw => Ok(frame.to_mulaw()),
            AudioEncoding::Alaw => Err(PipelineError::UnsupportedCodec("A-law".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16_silence(samples: usize) -> Vec<u8> {
        vec![0u8; samples * 2]
    }

    fn pcm16_tone(samples: usize, amplitude: i16) -> Vec<u8> {
        (0..samples).flat_map(|_| amplitude.to_le_bytes()).collect()
    }

    #[test]
    fn ingest_decodes_and_buffers_pcm16() {
        let pipeline = AudioPipeline::new(SampleRate::Hz8000);
        let frame = InboundFrame {
            timestamp_ms: 0,
            payload: pcm16_silence(160),
            codec: AudioEncoding::Pcm16,
        };
        pipeline.ingest(&frame);
        assert!(pipeline.buffered_duration() > Duration::from_millis(0));
    }

    #[test]
    fn loud_frame_fires_speech_start() {
        let pipeline = AudioPipeline::new(SampleRate::Hz8000);
        let frame = InboundFrame {
            timestamp_ms: 0,
            payload: pcm16_tone(160, 20_000),
            codec: AudioEncoding::Pcm16,
        };
        assert_eq!(pipeline.ingest(&frame), VadEdge::SpeechStart);
        assert!(pipeline.is_speaking());
    }

    #[test]
    fn alaw_frame_is_dropped_not_fatal() {
        let pipeline = AudioPipeline::new(SampleRate::Hz8000);
        let frame = InboundFrame {
            timestamp_ms: 0,
            payload: vec![0u8; 160],
            codec: AudioEncoding::Alaw,
        };
        assert_eq!(pipeline.ingest(&frame), VadEdge::None);
    }

    #[test]
    fn buffer_never_exceeds_the_four_second_cap() {
        let pipeline = AudioPipeline::new(SampleRate::Hz8000);
        for _ in 0..1000 {
            let frame = InboundFrame {
                timestamp_ms: 0,
                payload: pcm16_silence(160),
                codec: AudioEncoding::Pcm16,
            };
            pipeline.ingest(&frame);
        }
        assert!(pipeline.buffered_duration() <= INBOUND_BUFFER_CAPACITY);
    }
}
