//! Voice agent server entry point: the composition root described in §6/§9.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_config::{load_settings, Settings};
use voice_agent_core::{CallRecorder, CatalogIndex, LlmExtractor, OrderSink, StockService, TtsSynthesizer};
use voice_agent_server::state::{resolved_endpoint, AppState};
use voice_agent_server::websocket::media_handler;
use voice_agent_server::ServerError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice agent server");

    voice_agent_server::metrics::install(&settings.observability)?;

    if !settings.persistence.enabled {
        return Err(Box::new(ServerError::Config(
            "persistence.enabled is false; the server has no in-memory fallback for order/stock/call storage".to_string(),
        )));
    }

    let persistence = voice_agent_persistence::init(
        voice_agent_persistence::ScyllaConfig {
            hosts: settings.persistence.scylla_hosts.clone(),
            keyspace: settings.persistence.keyspace.clone(),
            replication_factor: 1,
        },
        settings.order_review.clone(),
    )
    .await
    .map_err(|e| ServerError::Persistence(e.to_string()))?;
    tracing::info!(keyspace = %settings.persistence.keyspace, "persistence layer ready");

    let products = persistence
        .stock
        .list_products()
        .await
        .map_err(|e| ServerError::Persistence(e.to_string()))?;

    let catalog = build_catalog(&settings, products).await?;
    let extractor = build_extractor(&settings)?;
    let tts = build_tts(&settings)?;

    let stock: Arc<dyn StockService> = persistence.stock.clone();
    let order_sink: Arc<dyn OrderSink> = persistence.orders.clone();
    let recorder: Arc<dyn CallRecorder> = persistence.calls.clone();

    let registry = voice_agent_agent::CallRegistry::new(settings.server.max_concurrent_calls);
    registry.set_recorder(recorder);
    let _reaper = registry.spawn_reaper(
        Duration::from_secs(settings.deadlines.reaper_interval_secs),
        Duration::from_secs(settings.deadlines.reaper_stale_after_secs),
    );

    let ws_path = settings.server.ws_path.clone();
    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = AppState {
        settings: Arc::new(settings.clone()),
        registry,
        extractor,
        catalog,
        stock,
        order_sink,
        tts,
        dialogue_thresholds: settings.dialogue_thresholds.clone(),
        catalog_thresholds: settings.catalog_thresholds.clone(),
        deadlines: settings.deadlines.clone(),
    };

    let app = Router::new()
        .route(&ws_path, get(media_handler))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, path = %ws_path, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("voice_agent={},tower_http=warn", settings.observability.log_level).into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn build_catalog(
    settings: &Settings,
    products: Vec<voice_agent_core::ProductRecord>,
) -> Result<Arc<dyn CatalogIndex>, ServerError> {
    let default = voice_agent_catalog::VectorStoreConfig::default();
    let credential = &settings.providers.catalog;
    let store_config = voice_agent_catalog::VectorStoreConfig {
        endpoint: resolved_endpoint(&credential.endpoint, &default.endpoint),
        api_key: credential.api_key.clone(),
        ..default
    };

    let store = voice_agent_catalog::VectorStore::new(store_config)
        .await
        .map_err(|e| ServerError::Provider(e.to_string()))?;
    let embedder = voice_agent_catalog::SimpleEmbedder::new(voice_agent_catalog::EmbeddingConfig::default());

    let index = voice_agent_catalog::SemanticCatalogIndex::new(store, embedder);
    let product_count = products.len();
    index
        .load_products(products)
        .await
        .map_err(|e| ServerError::Provider(e.to_string()))?;
    tracing::info!(products = product_count, "catalog index seeded");

    Ok(Arc::new(index))
}

fn build_extractor(settings: &Settings) -> Result<Arc<dyn LlmExtractor>, ServerError> {
    let default = voice_agent_llm::ChatConfig::default();
    let credential = &settings.providers.llm;
    let config = voice_agent_llm::ChatConfig {
        endpoint: resolved_endpoint(&credential.endpoint, &default.endpoint),
        api_key: credential.api_key.clone(),
        ..default
    };
    let client = voice_agent_llm::ChatClient::new(config).map_err(|e| ServerError::Provider(e.to_string()))?;
    Ok(Arc::new(voice_agent_llm::OpenAiExtractor::new(client)))
}

fn build_tts(settings: &Settings) -> Result<Arc<dyn TtsSynthesizer>, ServerError> {
    let default = voice_agent_pipeline::TtsConfig::default();
    let credential = &settings.providers.tts;
    let config = voice_agent_pipeline::TtsConfig {
        endpoint: resolved_endpoint(&credential.endpoint, &default.endpoint),
        api_key: credential.api_key.clone(),
        ..default
    };
    let tts = voice_agent_pipeline::ElevenLabsTts::new(config).map_err(|e| ServerError::Provider(e.to_string()))?;
    Ok(Arc::new(tts))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
