//! Audio frame types shared by the transport, pipeline, STT and TTS adapters.
//!
//! Telephony media is companded 8 kHz mono by default (see SPEC_FULL §6); frames
//! carry linear PCM internally once decoded so the pipeline and VAD can work on a
//! single representation regardless of the wire codec.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supported audio sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - telephony, the default wire rate for this system.
    #[default]
    Hz8000,
    /// 16kHz - used by some STT providers' streaming endpoints.
    Hz16000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
        }
    }

    /// Sample count for a 20ms VAD frame at this rate.
    pub fn frame_size_20ms(&self) -> usize {
        (self.as_u32() as usize * 20) / 1000
    }
}

/// Wire encodings this system's MediaTransport adapters understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AudioEncoding {
    /// 16-bit signed PCM, little-endian (internal working format).
    #[default]
    Pcm16,
    /// mu-law, companded 8-bit (conventional North American telephony).
    Mulaw,
    /// A-law, companded 8-bit (conventional European telephony).
    Alaw,
}

/// Audio channel configuration. This system only ever deals in mono telephony audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Channels {
    #[default]
    Mono,
}

impl Channels {
    pub fn count(&self) -> usize {
        1
    }
}

/// A decoded chunk of audio, carrying linear PCM samples plus VAD/sequencing metadata.
#[derive(Clone)]
pub struct AudioFrame {
    /// Samples normalized to [-1.0, 1.0].
    pub samples: Arc<[f32]>,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    /// Monotonic sequence number within a call, used to preserve ordering (§5).
    pub sequence: u64,
    pub timestamp: Instant,
    pub duration: Duration,
    /// Set by VAD once the frame has been classified.
    pub vad_probability: Option<f32>,
    pub is_speech: bool,
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .field("vad_probability", &self.vad_probability)
            .field("is_speech", &self.is_speech)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let duration = Duration::from_secs_f64(
            samples.len() as f64 / (sample_rate.as_u32() as f64 * channels.count() as f64),
        );
        let energy_db = Self::calculate_energy_db(&samples);

        Self {
            samples: samples.into(),
            sample_rate,
            channels,
            sequence,
            timestamp: Instant::now(),
            duration,
            vad_probability: None,
            is_speech: false,
            energy_db,
        }
    }

    fn calculate_energy_db(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return -96.0;
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt();
        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            -96.0
        }
    }

    /// Decode linear PCM16 bytes (little-endian) into a frame.
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / PCM16_NORMALIZE)
            .collect();
        Self::new(samples, sample_rate, channels, sequence)
    }

    /// Decode companded mu-law bytes into a frame, per ITU-T G.711.
    pub fn from_mulaw(bytes: &[u8], sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        let samples: Vec<f32> = bytes
            .iter()
            .map(|&b| mulaw_decode(b) as f32 / PCM16_NORMALIZE)
            .collect();
        Self::new(samples, sample_rate, channels, sequence)
    }

    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                ((clamped * PCM16_SCALE) as i16).to_le_bytes()
            })
            .collect()
    }

    /// Encode back to companded mu-law for the transport.
    pub fn to_mulaw(&self) -> Vec<u8> {
        self.samples
            .iter()
            .map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                mulaw_encode((clamped * PCM16_SCALE) as i16)
            })
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    pub fn is_likely_silence(&self, threshold_db: f32) -> bool {
        self.energy_db < threshold_db
    }
}

/// mu-law decode, per the standard G.711 bit-inversion algorithm.
fn mulaw_decode(byte: u8) -> i16 {
    const BIAS: i16 = 0x84;
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;
    let mut sample = ((mantissa as i16) << 3) + BIAS;
    sample <<= exponent;
    sample -= BIAS;
    if sign != 0 {
        -sample
    } else {
        sample
    }
}

fn mulaw_encode(pcm: i16) -> u8 {
    const BIAS: i16 = 0x84;
    const CLIP: i16 = 32635;
    let sign = if pcm < 0 { 0x80u8 } else { 0 };
    let mut sample = pcm.abs().min(CLIP) + BIAS;
    let mut exponent = 7i16;
    while exponent > 0 && (sample & 0x4000) == 0 {
        sample <<= 1;
        exponent -= 1;
    }
    let mantissa = (sample >> (exponent + 3)) & 0x0F;
    !(sign | ((exponent as u8) << 4) | mantissa as u8)
}

/// Drop-oldest circular buffer of decoded PCM samples, sized for a bounded duration.
///
/// This is the "never grow unboundedly under backpressure from STT" buffer from
/// SPEC_FULL §4.1/§9: one producer (the decode step) pushes, one consumer (STT
/// forwarding) drains.
#[derive(Debug)]
pub struct AudioBuffer {
    samples: std::collections::VecDeque<f32>,
    sample_rate: SampleRate,
    max_samples: usize,
}

impl AudioBuffer {
    pub fn new(sample_rate: SampleRate, max_duration: Duration) -> Self {
        let max_samples = (sample_rate.as_u32() as f64 * max_duration.as_secs_f64()) as usize;
        Self {
            samples: std::collections::VecDeque::with_capacity(max_samples),
            sample_rate,
            max_samples,
        }
    }

    /// Push a frame's samples, dropping the oldest samples if this would exceed capacity.
    pub fn push(&mut self, frame: &AudioFrame) {
        for &s in frame.samples.iter() {
            if self.samples.len() >= self.max_samples {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.as_u32() as f64)
    }

    /// Drain up to `count` samples from the front.
    pub fn drain(&mut self, count: usize) -> Vec<f32> {
        let count = count.min(self.samples.len());
        self.samples.drain(0..count).collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_frame_sizes() {
        assert_eq!(SampleRate::Hz8000.frame_size_20ms(), 160);
        assert_eq!(SampleRate::Hz16000.frame_size_20ms(), 320);
    }

    #[test]
    fn pcm16_round_trip() {
        let pcm16: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0];
        let frame = AudioFrame::from_pcm16(&pcm16, SampleRate::Hz16000, Channels::Mono, 0);
        assert_eq!(frame.samples.len(), 2);
        assert!(frame.samples[0] > 0.0);
        assert!(frame.samples[1] < 0.0);
    }

    #[test]
    fn mulaw_round_trip_is_lossy_but_close() {
        let original = AudioFrame::new(vec![0.25, -0.25, 0.0], SampleRate::Hz8000, Channels::Mono, 0);
        let encoded = original.to_mulaw();
        let decoded = AudioFrame::from_mulaw(&encoded, SampleRate::Hz8000, Channels::Mono, 0);
        for (a, b) in original.samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 0.05, "expected {a} ~= {b}");
        }
    }

    #[test]
    fn energy_calculation() {
        let silent = AudioFrame::new(vec![0.0; 160], SampleRate::Hz8000, Channels::Mono, 0);
        assert!(silent.energy_db < -90.0);
        let loud = AudioFrame::new(vec![0.5; 160], SampleRate::Hz8000, Channels::Mono, 0);
        assert!(loud.energy_db > -10.0);
    }

    #[test]
    fn drop_oldest_buffer_never_exceeds_capacity() {
        let mut buffer = AudioBuffer::new(SampleRate::Hz8000, Duration::from_millis(100));
        for _ in 0..20 {
            let frame = AudioFrame::new(vec![0.1; 160], SampleRate::Hz8000, Channels::Mono, 0);
            buffer.push(&frame);
        }
        assert!(buffer.len() <= 800, "buffer should cap at ~100ms of 8kHz audio");
    }
}
