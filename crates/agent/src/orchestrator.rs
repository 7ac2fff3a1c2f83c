//! CallOrchestrator (C9, §4.9): per-call composition root. Wires the media
//! transport, STT/TTS adapters and DialogueStateMachine into two cooperating
//! loops and tears them down on termination or cancellation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use voice_agent_config::DeadlineConfig;
use voice_agent_core::{
    CallStatus, ConversationContext, DialogueEffect, DialogueEvent, DialogueFsm, DialogueState,
    MediaTransport, SttStream, TtsSynthesizer,
};
use voice_agent_pipeline::AudioPipeline;

use crate::registry::{CallHandle, CallRegistry};

type AudioChunk = Vec<u8>;

/// Caps how much decoded PCM is drained per inbound frame before forwarding
/// to STT; the pipeline's own ~4s ring buffer does the real bounding.
const DRAIN_SAMPLES_PER_FRAME: usize = 16_000;

/// Queue of pending assistant utterances between the inbound dispatch loop
/// and the outbound TTS loop. Bounded; overflow drops the *oldest pending*
/// entry, never the one currently being synthesized (§4.9 step 4, outbound
/// loop note).
struct UtteranceQueue {
    inner: Mutex<VecDeque<String>>,
    notify: Notify,
    capacity: usize,
}

impl UtteranceQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    fn push(&self, utterance: String) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(utterance);
        drop(queue);
        self.notify.notify_one();
    }

    async fn pop(&self) -> String {
        loop {
            if let Some(utterance) = self.inner.lock().pop_front() {
                return utterance;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.notify.notify_waiters();
    }
}

const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 8;

/// Why a call's cooperating loops stopped running (§4.9 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    DialogueCompleted,
    DialogueTransferred,
    TransportStopped,
    SttClosed,
    Cancelled,
    Error,
}

impl TerminationReason {
    fn call_status(self) -> CallStatus {
        match self {
            TerminationReason::DialogueCompleted => CallStatus::Completed,
            TerminationReason::DialogueTransferred => CallStatus::Completed,
            TerminationReason::TransportStopped | TerminationReason::SttClosed => {
                CallStatus::Disconnected
            }
            TerminationReason::Cancelled => CallStatus::Timeout,
            TerminationReason::Error => CallStatus::Failed,
        }
    }
}

pub struct CallOrchestrator {
    transport: Arc<dyn MediaTransport>,
    stt: Arc<dyn SttStream>,
    tts: Arc<dyn TtsSynthesizer>,
    fsm: Arc<dyn DialogueFsm>,
    audio: Arc<AudioPipeline>,
    registry: Arc<CallRegistry>,
    handle: CallHandle,
    deadlines: DeadlineConfig,
}

impl CallOrchestrator {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        stt: Arc<dyn SttStream>,
        tts: Arc<dyn TtsSynthesizer>,
        fsm: Arc<dyn DialogueFsm>,
        audio: Arc<AudioPipeline>,
        registry: Arc<CallRegistry>,
        handle: CallHandle,
        deadlines: DeadlineConfig,
    ) -> Self {
        Self {
            transport,
            stt,
            tts,
            fsm,
            audio,
            registry,
            handle,
            deadlines,
        }
    }

    /// Runs the call to completion: greeting, the two cooperating loops, and
    /// teardown. Returns once the call has reached a terminal state.
    pub async fn run(mut self, mut context: ConversationContext) -> TerminationReason {
        context.transition(DialogueState::Greeting);
        let queue = Arc::new(UtteranceQueue::new(DEFAULT_OUTBOUND_QUEUE_CAPACITY));

        let greeting = "Hello, what would you like to order today?".to_string();
        context.add_turn(voice_agent_core::TurnRole::Assistant, greeting.clone());
        queue.push(greeting);

        let outbound = tokio::spawn(Self::outbound_loop(
            Arc::clone(&self.tts),
            Arc::clone(&self.transport),
            Arc::clone(&queue),
            self.handle.clone(),
        ));

        let reason = self.inbound_loop(&mut context, &queue).await;

        queue.close();
        let _ = tokio::time::timeout(
            Duration::from_millis(self.deadlines.outbound_drain_on_cancel_ms),
            outbound,
        )
        .await;

        let _ = self.stt.close().await;
        let _ = self.transport.stop().await;
        self.registry.release(&self.handle.call_id, reason.call_status());
        reason
    }

    async fn inbound_loop(
        &mut self,
        context: &mut ConversationContext,
        queue: &Arc<UtteranceQueue>,
    ) -> TerminationReason {
        loop {
            if self.handle.is_cancelled() {
                return TerminationReason::Cancelled;
            }

            tokio::select! {
                biased;

                _ = self.handle.cancelled() => return TerminationReason::Cancelled,

                frame = self.transport.recv_frame() => {
                    match frame {
                        None => return TerminationReason::TransportStopped,
                        Some(frame) => {
                            self.audio.ingest(&frame);
                            let pcm = self.audio.drain_pcm16(DRAIN_SAMPLES_PER_FRAME);
                            if !pcm.is_empty() {
                                if let Err(e) = self.stt.write_audio(&pcm).await {
                                    tracing::warn!(error = %e, "failed forwarding audio to STT");
                                    return TerminationReason::Error;
                                }
                            }
                        }
                    }
                }

                event = self.stt.recv() => {
                    match event {
                        None => return TerminationReason::SttClosed,
                        Some(event) if event.is_final => {
                            match self.fsm.handle(context, DialogueEvent::FinalTranscript {
                                text: event.text,
                                confidence: event.confidence,
                            }).await {
                                Ok(effects) => {
                                    for effect in effects {
                                        if let DialogueEffect::UtteranceEmitted(text) = effect {
                                            queue.push(text);
                                        }
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "dialogue handler failed");
                                    return TerminationReason::Error;
                                }
                            }
                            match context.state {
                                DialogueState::Completed => return TerminationReason::DialogueCompleted,
                                DialogueState::Transferring => return TerminationReason::DialogueTransferred,
                                DialogueState::Error => return TerminationReason::Error,
                                _ => {}
                            }
                        }
                        Some(event) => {
                            context.last_transcript = Some(event.text);
                        }
                    }
                }
            }
        }
    }

    async fn outbound_loop(
        tts: Arc<dyn TtsSynthesizer>,
        transport: Arc<dyn MediaTransport>,
        queue: Arc<UtteranceQueue>,
        mut handle: CallHandle,
    ) {
        loop {
            let utterance = tokio::select! {
                _ = handle.cancelled() => return,
                text = queue.pop() => text,
            };

            let tts_started = std::time::Instant::now();
            let synth_result = tts.synthesize(&utterance).await;
            metrics::histogram!("voice_agent_tts_synthesize_seconds").record(tts_started.elapsed().as_secs_f64());
            let chunks: Vec<AudioChunk> = match synth_result {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(error = %e, "TTS synthesis failed outside its own fallback path");
                    continue;
                }
            };

            for chunk in chunks {
                if handle.is_cancelled() {
                    break;
                }
                if let Err(e) = transport.send_frame(chunk).await {
                    tracing::warn!(error = %e, "failed writing outbound audio frame");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as TokioMutex;
    use voice_agent_core::{
        AudioEncoding, CatalogIndex, CatalogMatch, DialogueTurn, Error, ExtractedItem,
        ExtractionResult, FsmError, InboundFrame, LlmExtractor, OrderRequest, OrderResult,
        OrderSink, ProductRecord, Result, SampleRate, StockService, TranscriptEvent,
    };

    use crate::fsm::DialogueStateMachine;

    struct ScriptedTransport {
        frames: TokioMutex<VecDeque<InboundFrame>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl MediaTransport for ScriptedTransport {
        async fn recv_frame(&self) -> Option<InboundFrame> {
            self.frames.lock().await.pop_front()
        }
        async fn send_frame(&self, payload: Vec<u8>) -> Result<()> {
            self.sent.lock().push(payload);
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        fn codec(&self) -> AudioEncoding {
            AudioEncoding::Mulaw
        }
    }

    struct ScriptedStt {
        events: TokioMutex<VecDeque<TranscriptEvent>>,
    }

    #[async_trait]
    impl SttStream for ScriptedStt {
        async fn write_audio(&self, _pcm: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn recv(&self) -> Option<TranscriptEvent> {
            self.events.lock().await.pop_front()
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct EchoTts;

    #[async_trait]
    impl TtsSynthesizer for EchoTts {
        async fn synthesize(&self, _text: &str) -> Result<Vec<AudioChunk>> {
            Ok(vec![vec![1, 2, 3]])
        }
    }

    struct AffirmativeFsm;

    #[async_trait]
    impl DialogueFsm for AffirmativeFsm {
        async fn handle(
            &self,
            context: &mut ConversationContext,
            event: DialogueEvent,
        ) -> std::result::Result<Vec<DialogueEffect>, FsmError> {
            let DialogueEvent::FinalTranscript { .. } = event;
            context.transition(DialogueState::Collecting);
            context.transition(DialogueState::Confirming);
            context.transition(DialogueState::Processing);
            context.transition(DialogueState::Completed);
            Ok(vec![
                DialogueEffect::OrderCreated { order_id: "CMD-1".to_string(), requires_human_review: false },
                DialogueEffect::UtteranceEmitted("Your order CMD-1 is confirmed.".to_string()),
            ])
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_completed_and_releases_the_registry_slot() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C1", "+229000001", None).unwrap();

        let mut events = VecDeque::new();
        events.push_back(TranscriptEvent {
            text: "that's all".to_string(),
            is_final: true,
            confidence: 0.9,
        });

        let transport = Arc::new(ScriptedTransport {
            frames: TokioMutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(ScriptedStt { events: TokioMutex::new(events) });

        let orchestrator = CallOrchestrator::new(
            transport,
            stt,
            Arc::new(EchoTts),
            Arc::new(AffirmativeFsm),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let mut ctx = ConversationContext::new();
        ctx.set_call("C1", None);
        let reason = orchestrator.run(ctx).await;

        assert_eq!(reason, TerminationReason::DialogueCompleted);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn transport_ending_the_stream_is_a_clean_termination() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C2", "+229000002", None).unwrap();

        let transport = Arc::new(ScriptedTransport {
            frames: TokioMutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(ScriptedStt { events: TokioMutex::new(VecDeque::new()) });

        let orchestrator = CallOrchestrator::new(
            transport,
            stt,
            Arc::new(EchoTts),
            Arc::new(AffirmativeFsm),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let reason = orchestrator.run(ConversationContext::new()).await;
        assert_eq!(reason, TerminationReason::TransportStopped);
    }

    struct EmptyExtractor;

    #[async_trait]
    impl LlmExtractor for EmptyExtractor {
        async fn extract(&self, _text: &str, _recent_turns: &[DialogueTurn]) -> Result<ExtractionResult> {
            Ok(ExtractionResult { items: vec![] })
        }
    }

    struct NoCatalogHits;

    #[async_trait]
    impl CatalogIndex for NoCatalogHits {
        async fn search(&self, _query: &str, _k: usize, _min_score: f32) -> Result<Vec<CatalogMatch>> {
            Ok(vec![])
        }
    }

    struct AlwaysInStock;

    #[async_trait]
    impl StockService for AlwaysInStock {
        async fn check_stock(&self, _product_key: &str, _qty: u32) -> Result<bool> {
            Ok(true)
        }
        async fn reserve(&self, _product_key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
        async fn release(&self, _product_key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
    }

    struct UnreachableOrderSink;

    #[async_trait]
    impl OrderSink for UnreachableOrderSink {
        async fn create(&self, _request: OrderRequest) -> Result<OrderResult> {
            panic!("order sink must not be reached once a call has escalated");
        }
    }

    fn default_thresholds() -> (voice_agent_config::DialogueThresholds, voice_agent_config::CatalogThresholds) {
        (voice_agent_config::DialogueThresholds::default(), voice_agent_config::CatalogThresholds::default())
    }

    #[tokio::test]
    async fn low_confidence_transcripts_escalate_to_a_transfer() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C3", "+229000003", None).unwrap();

        let mut events = VecDeque::new();
        for _ in 0..3 {
            events.push_back(TranscriptEvent {
                text: "mumble".to_string(),
                is_final: true,
                confidence: 0.3,
            });
        }

        let transport = Arc::new(ScriptedTransport {
            frames: TokioMutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(ScriptedStt { events: TokioMutex::new(events) });

        let (dialogue, catalog_thresholds) = default_thresholds();
        let fsm = DialogueStateMachine::new(
            Arc::new(EmptyExtractor),
            Arc::new(NoCatalogHits),
            Arc::new(AlwaysInStock),
            Arc::new(UnreachableOrderSink),
            dialogue,
            catalog_thresholds,
        );

        let orchestrator = CallOrchestrator::new(
            transport,
            stt,
            Arc::new(EchoTts),
            Arc::new(fsm),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let mut ctx = ConversationContext::new();
        ctx.set_call("C3", None);
        let reason = orchestrator.run(ctx).await;

        assert_eq!(reason, TerminationReason::DialogueTransferred);
        assert_eq!(registry.active_count(), 0);
    }

    struct OneItemExtractor;

    #[async_trait]
    impl LlmExtractor for OneItemExtractor {
        async fn extract(&self, _text: &str, _recent_turns: &[DialogueTurn]) -> Result<ExtractionResult> {
            Ok(ExtractionResult {
                items: vec![ExtractedItem {
                    name: "Spasfon".to_string(),
                    quantity: 5,
                    unit: "boxes".to_string(),
                }],
            })
        }
    }

    struct OneCatalogHit;

    #[async_trait]
    impl CatalogIndex for OneCatalogHit {
        async fn search(&self, _query: &str, _k: usize, _min_score: f32) -> Result<Vec<CatalogMatch>> {
            Ok(vec![CatalogMatch {
                product: ProductRecord {
                    key: "p-spasfon".to_string(),
                    display_name: "Spasfon".to_string(),
                    category: "meds".to_string(),
                    unit_price: 3.0,
                    metadata: serde_json::Value::Null,
                },
                score: 0.8,
            }])
        }
    }

    struct NeverInStock;

    #[async_trait]
    impl StockService for NeverInStock {
        async fn check_stock(&self, _product_key: &str, _qty: u32) -> Result<bool> {
            Ok(false)
        }
        async fn reserve(&self, _product_key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
        async fn release(&self, _product_key: &str, _qty: u32) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingOrderSink {
        requests: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl OrderSink for RecordingOrderSink {
        async fn create(&self, request: OrderRequest) -> Result<OrderResult> {
            let requires_human_review = request.any_out_of_stock;
            self.requests.lock().push(request);
            Ok(OrderResult {
                order_id: "CMD-OOS".to_string(),
                requires_human_review,
                review_reason: None,
            })
        }
    }

    #[tokio::test]
    async fn out_of_stock_item_still_completes_and_flags_for_review() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C4", "+229000004", None).unwrap();

        let mut events = VecDeque::new();
        events.push_back(TranscriptEvent {
            text: "5 Spasfon please".to_string(),
            is_final: true,
            confidence: 0.95,
        });
        events.push_back(TranscriptEvent {
            text: "that's all".to_string(),
            is_final: true,
            confidence: 0.95,
        });
        events.push_back(TranscriptEvent {
            text: "yes".to_string(),
            is_final: true,
            confidence: 0.95,
        });

        let transport = Arc::new(ScriptedTransport {
            frames: TokioMutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(ScriptedStt { events: TokioMutex::new(events) });

        let order_sink = Arc::new(RecordingOrderSink { requests: Mutex::new(Vec::new()) });

        let (dialogue, catalog_thresholds) = default_thresholds();
        let fsm = DialogueStateMachine::new(
            Arc::new(OneItemExtractor),
            Arc::new(OneCatalogHit),
            Arc::new(NeverInStock),
            order_sink.clone(),
            dialogue,
            catalog_thresholds,
        );

        let orchestrator = CallOrchestrator::new(
            transport,
            stt,
            Arc::new(EchoTts),
            Arc::new(fsm),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let mut ctx = ConversationContext::new();
        ctx.set_call("C4", None);
        let reason = orchestrator.run(ctx).await;

        assert_eq!(reason, TerminationReason::DialogueCompleted);
        let requests = order_sink.requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].any_out_of_stock);
        assert!(requests[0].items.is_empty());
    }

    struct RecordingFsm {
        inner: DialogueStateMachine,
        snapshots: Mutex<Vec<(DialogueState, u32)>>,
    }

    #[async_trait]
    impl DialogueFsm for RecordingFsm {
        async fn handle(
            &self,
            context: &mut ConversationContext,
            event: DialogueEvent,
        ) -> std::result::Result<Vec<DialogueEffect>, FsmError> {
            let effects = self.inner.handle(context, event).await?;
            self.snapshots.lock().push((context.state, context.attempts));
            Ok(effects)
        }
    }

    #[tokio::test]
    async fn empty_extraction_reprompts_without_incrementing_attempts() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C5", "+229000005", None).unwrap();

        let mut events = VecDeque::new();
        events.push_back(TranscriptEvent {
            text: "I'd like something".to_string(),
            is_final: true,
            confidence: 0.95,
        });

        let transport = Arc::new(ScriptedTransport {
            frames: TokioMutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        });
        let stt = Arc::new(ScriptedStt { events: TokioMutex::new(events) });

        let (dialogue, catalog_thresholds) = default_thresholds();
        let inner = DialogueStateMachine::new(
            Arc::new(EmptyExtractor),
            Arc::new(NoCatalogHits),
            Arc::new(AlwaysInStock),
            Arc::new(UnreachableOrderSink),
            dialogue,
            catalog_thresholds,
        );
        let fsm = Arc::new(RecordingFsm { inner, snapshots: Mutex::new(Vec::new()) });

        let orchestrator = CallOrchestrator::new(
            transport,
            stt,
            Arc::new(EchoTts),
            fsm.clone(),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let mut ctx = ConversationContext::new();
        ctx.set_call("C5", None);
        let reason = orchestrator.run(ctx).await;

        assert_eq!(reason, TerminationReason::SttClosed);
        let snapshots = fsm.snapshots.lock();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0], (DialogueState::Collecting, 0));
    }

    #[test]
    fn capacity_refusal_leaves_existing_calls_unaffected() {
        let registry = CallRegistry::new(1);
        let _handle = registry.admit("C6", "+229000006", None).unwrap();

        let err = registry.admit("C7", "+229000007", None).unwrap_err();
        assert!(matches!(err, Error::AtCapacity));
        assert_eq!(registry.active_count(), 1);
    }

    /// Never resolves; forces `inbound_loop`'s select to wait on the
    /// cancellation branch instead of racing it against an instantly-ready
    /// `None` the way an empty `ScriptedTransport`/`ScriptedStt` would.
    struct PendingTransport;

    #[async_trait]
    impl MediaTransport for PendingTransport {
        async fn recv_frame(&self) -> Option<InboundFrame> {
            std::future::pending().await
        }
        async fn send_frame(&self, _payload: Vec<u8>) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        fn codec(&self) -> AudioEncoding {
            AudioEncoding::Mulaw
        }
    }

    struct PendingStt;

    #[async_trait]
    impl SttStream for PendingStt {
        async fn write_audio(&self, _pcm: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn recv(&self) -> Option<TranscriptEvent> {
            std::future::pending().await
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stale_reap_mid_call_tears_down_within_the_drain_budget() {
        let registry = CallRegistry::new(4);
        let handle = registry.admit("C8", "+229000008", None).unwrap();

        let orchestrator = CallOrchestrator::new(
            Arc::new(PendingTransport),
            Arc::new(PendingStt),
            Arc::new(EchoTts),
            Arc::new(AffirmativeFsm),
            Arc::new(AudioPipeline::new(SampleRate::Hz8000)),
            Arc::clone(&registry),
            handle,
            DeadlineConfig::default(),
        );

        let reaper_registry = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reaper_registry.reap_stale(Duration::ZERO);
        });

        let started = std::time::Instant::now();
        let reason = orchestrator.run(ConversationContext::new()).await;
        let elapsed = started.elapsed();

        assert_eq!(reason, TerminationReason::Cancelled);
        assert_eq!(reason.call_status(), CallStatus::Timeout);
        assert!(elapsed < Duration::from_millis(900), "teardown took {elapsed:?}");
        assert_eq!(registry.active_count(), 0);
    }
}
