//! `MediaTransport` over an axum websocket (C1, §4.1, §6): the real-world
//! counterpart to the orchestrator test suite's scripted in-memory fake.
//!
//! Binary frames carry raw encoded audio payload in submission order; the
//! codec is negotiated once at upgrade time (the `codec` query parameter)
//! and reported for the lifetime of the connection, matching the contract's
//! "adapter MAY negotiate otherwise and report the codec on session-start".

use std::time::Instant;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use voice_agent_core::{AudioEncoding, Error, InboundFrame, Result};

pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    started_at: Instant,
    codec: AudioEncoding,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket, codec: AudioEncoding) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            started_at: Instant::now(),
            codec,
        }
    }
}

#[async_trait]
impl voice_agent_core::MediaTransport for WebSocketTransport {
    async fn recv_frame(&self) -> Option<InboundFrame> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                None => return None,
                Some(Ok(Message::Binary(payload))) => {
                    return Some(InboundFrame {
                        timestamp_ms: self.started_at.elapsed().as_millis() as u64,
                        payload,
                        codec: self.codec,
                    });
                }
                Some(Ok(Message::Close(_))) => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket media read failed");
                    return None;
                }
            }
        }
    }

    async fn send_frame(&self, payload: Vec<u8>) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(payload))
            .await
            .map_err(|e| Error::TransportFailure(e.to_string()))
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
        Ok(())
    }

    fn codec(&self) -> AudioEncoding {
        self.codec
    }
}

pub fn codec_from_query(codec: Option<&str>) -> AudioEncoding {
    match codec {
        Some("pcm16") => AudioEncoding::Pcm16,
        Some("alaw") => AudioEncoding::Alaw,
        _ => AudioEncoding::Mulaw,
    }
}
