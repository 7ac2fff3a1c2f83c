//! Streaming STT adapter (C3, §4.2): a WebSocket client speaking a
//! Deepgram-shaped live-transcription protocol, grounded on the
//! `start_streaming`/`send_audio`/`close` contract of the cloud STT client
//! this system replaces an on-device model with.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use voice_agent_core::{Error, Result, SttStream, TranscriptEvent};

#[derive(Debug, Clone)]
pub struct SttConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: None,
            model: "nova-2".to_string(),
            language: "en".to_string(),
        }
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Streaming STT session backed by a live WebSocket connection.
///
/// Outbound audio is written directly to the socket; inbound transcript
/// frames are decoded by a background task and forwarded over an internal
/// channel so `recv` never blocks on socket I/O directly.
pub struct WebsocketSttStream {
    sink: Mutex<WsSink>,
    events: Mutex<mpsc::Receiver<TranscriptEvent>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl WebsocketSttStream {
    pub async fn connect(config: &SttConfig) -> Result<Self> {
        let mut url = Url::parse(&config.endpoint)
            .map_err(|e| Error::TransportFailure(format!("invalid STT endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &config.model);
            query.append_pair("language", &config.language);
            query.append_pair("smart_format", "true");
            query.append_pair("interim_results", "true");
            query.append_pair("punctuate", "true");
            query.append_pair("vad_events", "true");
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::TransportFailure(format!("bad STT request: {e}")))?;
        if let Some(key) = &config.api_key {
            let header_value = format!("Token {key}")
                .parse()
                .map_err(|_| Error::TransportFailure("invalid STT api key".to_string()))?;
            request.headers_mut().insert("Authorization", header_value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("STT connect failed: {e}")))?;
        let (sink, mut stream) = stream.split();

        let (tx, rx) = mpsc::channel(64);
        let reader_task = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "STT socket read failed");
                        break;
                    }
                };
                let Message::Text(text) = msg else { continue };
                match serde_json::from_str::<DeepgramMessage>(&text) {
                    Ok(DeepgramMessage::Results { channel, is_final }) => {
                        if let Some(alt) = channel.alternatives.into_iter().next() {
                            if alt.transcript.is_empty() {
                                continue;
                            }
                            let event = TranscriptEvent {
                                text: alt.transcript,
                                is_final,
                                confidence: alt.confidence,
                            };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(DeepgramMessage::Error { description }) => {
                        tracing::warn!(%description, "STT upstream reported an error");
                    }
                    Ok(DeepgramMessage::Other) | Err(_) => {}
                }
            }
        });

        Ok(Self {
            sink: Mutex::new(sink),
            events: Mutex::new(rx),
            reader_task,
        })
    }
}

#[async_trait]
impl SttStream for WebsocketSttStream {
    async fn write_audio(&self, pcm: &[u8]) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(pcm.to_vec()))
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("STT write failed: {e}")))
    }

    async fn recv(&self) -> Option<TranscriptEvent> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        let close_frame = serde_json::json!({"type": "CloseStream"}).to_string();
        let _ = self.sink.lock().await.send(Message::Text(close_frame)).await;
        let _ = self.sink.lock().await.close().await;
        self.reader_task.abort();
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeepgramMessage {
    Results {
        channel: DeepgramChannel,
        is_final: bool,
    },
    #[serde(rename = "Error")]
    Error {
        description: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_targets_deepgram_listen() {
        let config = SttConfig::default();
        assert!(config.endpoint.contains("deepgram"));
        assert_eq!(config.model, "nova-2");
    }

    #[test]
    fn results_message_parses_final_transcript() {
        let raw = serde_json::json!({
            "type": "Results",
            "is_final": true,
            "channel": {"alternatives": [{"transcript": "two pizzas", "confidence": 0.94}]}
        });
        let parsed: DeepgramMessage = serde_json::from_value(raw).unwrap();
        match parsed {
            DeepgramMessage::Results { channel, is_final } => {
                assert!(is_final);
                assert_eq!(channel.alternatives[0].transcript, "two pizzas");
            }
            _ => panic!("expected Results variant"),
        }
    }
}
