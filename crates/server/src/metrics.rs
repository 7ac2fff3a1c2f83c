//! Installs the Prometheus recorder the `metrics` macros used across
//! `core`/`agent` write into (§11: "the counters are recorded through the
//! library so a host process can expose them however it wants").

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use voice_agent_config::settings::ObservabilityConfig;

use crate::ServerError;

/// Binds a `/metrics` HTTP listener on its own port when enabled. A no-op
/// when `observability.metrics_enabled` is false — the macros still run,
/// their output just has nowhere to be scraped from.
pub fn install(observability: &ObservabilityConfig) -> Result<(), ServerError> {
    if !observability.metrics_enabled {
        tracing::info!("metrics exporter disabled by configuration");
        return Ok(());
    }

    let addr: SocketAddr = ([0, 0, 0, 0], observability.metrics_port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Provider(format!("failed to install metrics exporter: {e}")))?;

    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
