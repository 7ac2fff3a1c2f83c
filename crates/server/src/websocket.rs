//! Media websocket upgrade handler (§6, §9): admits a call, wires a per-call
//! `DialogueStateMachine` and `CallOrchestrator`, and runs it to completion.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use voice_agent_agent::{CallOrchestrator, DialogueStateMachine};
use voice_agent_core::{AudioEncoding, ConversationContext, SampleRate};
use voice_agent_pipeline::AudioPipeline;

use crate::state::{resolved_endpoint, AppState};
use crate::transport::{codec_from_query, WebSocketTransport};

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    call_id: Option<String>,
    phone: Option<String>,
    tenant: Option<String>,
    codec: Option<String>,
}

pub async fn media_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> impl IntoResponse {
    let call_id = query.call_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let phone = query.phone.unwrap_or_default();
    let codec = codec_from_query(query.codec.as_deref());

    ws.on_upgrade(move |socket| handle_call(socket, state, call_id, phone, query.tenant, codec))
}

async fn handle_call(
    socket: axum::extract::ws::WebSocket,
    state: AppState,
    call_id: String,
    phone: String,
    tenant: Option<String>,
    codec: AudioEncoding,
) {
    let handle = match state.registry.admit(call_id.clone(), phone, tenant.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "refused media connection");
            return;
        }
    };

    let span = tracing::info_span!("call", call_id = %call_id, tenant = tenant.as_deref().unwrap_or(""));
    let _enter = span.enter();

    let transport = Arc::new(WebSocketTransport::new(socket, codec));

    let stt = match voice_agent_pipeline::WebsocketSttStream::connect(&stt_config(&state)).await {
        Ok(stt) => Arc::new(stt),
        Err(e) => {
            tracing::error!(error = %e, "failed to start STT session, dropping call");
            state.registry.release(&call_id, voice_agent_core::CallStatus::Failed);
            return;
        }
    };

    let fsm = Arc::new(DialogueStateMachine::new(
        state.extractor.clone(),
        state.catalog.clone(),
        state.stock.clone(),
        state.order_sink.clone(),
        state.dialogue_thresholds.clone(),
        state.catalog_thresholds.clone(),
    ));

    let audio = Arc::new(AudioPipeline::new(SampleRate::Hz8000));

    let mut context = ConversationContext::new();
    context.set_call(call_id.clone(), tenant);

    let orchestrator = CallOrchestrator::new(
        transport,
        stt,
        state.tts.clone(),
        fsm,
        audio,
        state.registry.clone(),
        handle,
        state.deadlines.clone(),
    );

    let session_max = Duration::from_secs(state.deadlines.session_max_secs);
    match tokio::time::timeout(session_max, orchestrator.run(context)).await {
        Ok(reason) => tracing::info!(?reason, "call terminated"),
        Err(_) => tracing::warn!("call exceeded session ceiling, forcibly ended"),
    }
}

fn stt_config(state: &AppState) -> voice_agent_pipeline::SttConfig {
    let default = voice_agent_pipeline::SttConfig::default();
    let credential = &state.settings.providers.stt;
    voice_agent_pipeline::SttConfig {
        endpoint: resolved_endpoint(&credential.endpoint, &default.endpoint),
        api_key: credential.api_key.clone(),
        ..default
    }
}
