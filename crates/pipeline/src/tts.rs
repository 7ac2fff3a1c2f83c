//! TTS adapter (C7, §4.5): streams synthesized speech from an ElevenLabs-shaped
//! HTTP endpoint, cached by (text, voice) so repeated prompts ("Anything
//! else?") don't re-hit the upstream, and degrading to a pre-recorded
//! fallback chunk rather than an error when the upstream is unavailable.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;

use voice_agent_core::{Error, Result, TtsSynthesizer};

type AudioChunk = Vec<u8>;

/// How long a cached synthesis result stays valid.
const CACHE_TTL: Duration = Duration::from_secs(600);
const CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io/v1".to_string(),
            api_key: None,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            timeout: Duration::from_secs(10),
        }
    }
}

struct CacheEntry {
    chunks: Vec<AudioChunk>,
    cached_at: Instant,
}

pub struct ElevenLabsTts {
    config: TtsConfig,
    http: Client,
    cache: Mutex<LruCache<u64, CacheEntry>>,
    fallback: Vec<AudioChunk>,
}

impl ElevenLabsTts {
    pub fn new(config: TtsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::TransportFailure(e.to_string()))?;
        Ok(Self {
            config,
            http,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is nonzero"),
            )),
            fallback: vec![silent_fallback_chunk()],
        })
    }

    fn cache_key(&self, text: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        self.config.voice_id.hash(&mut hasher);
        hasher.finish()
    }

    async fn synthesize_upstream(&self, text: &str) -> Result<Vec<AudioChunk>> {
        let url = format!(
            "{}/text-to-speech/{}/stream",
            self.config.endpoint.trim_end_matches('/'),
            self.config.voice_id
        );
        let body = SynthesizeRequest {
            text: text.to_string(),
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        let mut request = self.http.post(url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("xi-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("TTS request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "TTS upstream returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("TTS read failed: {e}")))?;

        // The upstream streams MP3 frames; chunk it for incremental playback
        // rather than waiting for the whole buffer to be written to the wire.
        const CHUNK_SIZE: usize = 4096;
        Ok(bytes.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect())
    }
}

#[async_trait]
impl TtsSynthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioChunk>> {
        let key = self.cache_key(text);
        if let Some(entry) = self.cache.lock().get(&key) {
            if entry.cached_at.elapsed() < CACHE_TTL {
                return Ok(entry.chunks.clone());
            }
        }

        match self.synthesize_upstream(text).await {
            Ok(chunks) => {
                self.cache.lock().put(
                    key,
                    CacheEntry {
                        chunks: chunks.clone(),
                        cached_at: Instant::now(),
                    },
                );
                Ok(chunks)
            }
            Err(e) => {
                tracing::warn!(error = %e, "TTS synthesis failed, using fallback chunk");
                Ok(self.fallback.clone())
            }
        }
    }
}

/// A short, pre-recorded silence chunk played when the TTS upstream is down,
/// so the caller is never left with dead air and no audio at all (§4.5).
fn silent_fallback_chunk() -> AudioChunk {
    vec![0xFFu8; 160] // mu-law silence, one 20ms frame at 8kHz
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest {
    text: String,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_uses_a_reasonable_voice() {
        let config = TtsConfig::default();
        assert!(!config.voice_id.is_empty());
        assert!((0.0..=1.0).contains(&config.stability));
    }

    #[tokio::test]
    async fn upstream_failure_falls_back_instead_of_erroring() {
        let tts = ElevenLabsTts::new(TtsConfig {
            endpoint: "http://127.0.0.1:1".to_string(), // nothing listens here
            timeout: Duration::from_millis(200),
            ..TtsConfig::default()
        })
        .unwrap();

        let result = tts.synthesize("anything else?").await.unwrap();
        assert_eq!(result, vec![silent_fallback_chunk()]);
    }

    #[tokio::test]
    async fn cache_key_differs_by_voice() {
        let a = ElevenLabsTts::new(TtsConfig {
            voice_id: "voice-a".to_string(),
            ..TtsConfig::default()
        })
        .unwrap();
        let b = ElevenLabsTts::new(TtsConfig {
            voice_id: "voice-b".to_string(),
            ..TtsConfig::default()
        })
        .unwrap();
        assert_ne!(a.cache_key("hello"), b.cache_key("hello"));
    }
}
