//! Composition-root state (§6, §9): the concrete providers and per-call
//! configuration every websocket connection needs to build a
//! `DialogueStateMachine` and `CallOrchestrator`.

use std::sync::Arc;

use voice_agent_config::{CatalogThresholds, DeadlineConfig, DialogueThresholds, Settings};
use voice_agent_core::{CatalogIndex, LlmExtractor, OrderSink, StockService, TtsSynthesizer};

use voice_agent_agent::CallRegistry;

/// Shared across every websocket connection. Cloned cheaply (everything
/// inside is an `Arc`); never locked as a whole.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<CallRegistry>,
    pub extractor: Arc<dyn LlmExtractor>,
    pub catalog: Arc<dyn CatalogIndex>,
    pub stock: Arc<dyn StockService>,
    pub order_sink: Arc<dyn OrderSink>,
    pub tts: Arc<dyn TtsSynthesizer>,
    pub dialogue_thresholds: DialogueThresholds,
    pub catalog_thresholds: CatalogThresholds,
    pub deadlines: DeadlineConfig,
}

/// `EndpointCredential.endpoint` defaults to an empty string when unset in
/// `Settings` (§12: never default a literal credential); provider adapters
/// instead carry their own real-world default endpoint, used unless the
/// operator configured one explicitly.
pub fn resolved_endpoint(configured: &str, adapter_default: &str) -> String {
    if configured.is_empty() {
        adapter_default.to_string()
    } else {
        configured.to_string()
    }
}
