//! `Settings`: the layered application configuration (§12).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{catalog, deadlines, dialogue, order_review, reaper};
use crate::ConfigError;

/// Selects stricter defaults (mandatory TLS, JSON logging) without branching
/// at call sites — components read `Settings`, never this enum, directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
    #[serde(default)]
    pub catalog_thresholds: CatalogThresholds,
    #[serde(default)]
    pub dialogue_thresholds: DialogueThresholds,
    #[serde(default)]
    pub order_review: OrderReviewThresholds,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_dialogue_thresholds()?;
        self.validate_catalog_thresholds()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.server.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_concurrent_calls".to_string(),
                message: "must be at least 1 (I5's capacity bound)".to_string(),
            });
        }
        if self.environment.is_production()
            && self.providers.stt.api_key.is_none()
        {
            tracing::warn!("production environment with no STT provider credential configured");
        }
        Ok(())
    }

    fn validate_dialogue_thresholds(&self) -> Result<(), ConfigError> {
        let t = &self.dialogue_thresholds;
        for (field, value) in [
            ("low_confidence_threshold", t.low_confidence_threshold),
            ("escalation_confidence_upper", t.escalation_confidence_upper),
            ("greeting_floor", t.greeting_floor),
            ("clarifying_floor", t.clarifying_floor),
            ("additive_floor", t.additive_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: format!("dialogue_thresholds.{field}"),
                    message: format!("must be in [0.0, 1.0], got {value}"),
                });
            }
        }
        if t.min_quantity > t.max_quantity {
            return Err(ConfigError::InvalidValue {
                field: "dialogue_thresholds.min_quantity".to_string(),
                message: "min_quantity cannot exceed max_quantity".to_string(),
            });
        }
        Ok(())
    }

    fn validate_catalog_thresholds(&self) -> Result<(), ConfigError> {
        let c = &self.catalog_thresholds;
        if !(0.0..=1.0).contains(&c.min_score) || !(0.0..=1.0).contains(&c.fuzzy_fallback_score) {
            return Err(ConfigError::InvalidValue {
                field: "catalog_thresholds".to_string(),
                message: "scores must be in [0.0, 1.0]".to_string(),
            });
        }
        Ok(())
    }
}

/// Bind address and the I5 concurrent-call capacity bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/media".to_string()
}
fn default_max_concurrent_calls() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

/// §5's per-operation deadlines, the session ceiling and the reaper cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    #[serde(default = "d_session_max_secs")]
    pub session_max_secs: u64,
    #[serde(default = "d_llm_extract_ms")]
    pub llm_extract_ms: u64,
    #[serde(default = "d_catalog_search_ms")]
    pub catalog_search_ms: u64,
    #[serde(default = "d_stock_check_ms")]
    pub stock_check_ms: u64,
    #[serde(default = "d_tts_first_chunk_ms")]
    pub tts_first_chunk_ms: u64,
    #[serde(default = "d_order_sink_ms")]
    pub order_sink_ms: u64,
    #[serde(default = "d_outbound_drain_ms")]
    pub outbound_drain_on_cancel_ms: u64,
    #[serde(default = "d_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    #[serde(default = "d_reaper_stale_after_secs")]
    pub reaper_stale_after_secs: u64,
}

fn d_session_max_secs() -> u64 {
    deadlines::SESSION_MAX_SECS
}
fn d_llm_extract_ms() -> u64 {
    deadlines::LLM_EXTRACT_MS
}
fn d_catalog_search_ms() -> u64 {
    deadlines::CATALOG_SEARCH_MS
}
fn d_stock_check_ms() -> u64 {
    deadlines::STOCK_CHECK_MS
}
fn d_tts_first_chunk_ms() -> u64 {
    deadlines::TTS_FIRST_CHUNK_MS
}
fn d_order_sink_ms() -> u64 {
    deadlines::ORDER_SINK_MS
}
fn d_outbound_drain_ms() -> u64 {
    deadlines::OUTBOUND_DRAIN_ON_CANCEL_MS
}
fn d_reaper_interval_secs() -> u64 {
    reaper::INTERVAL_SECS
}
fn d_reaper_stale_after_secs() -> u64 {
    reaper::STALE_AFTER_SECS
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            session_max_secs: d_session_max_secs(),
            llm_extract_ms: d_llm_extract_ms(),
            catalog_search_ms: d_catalog_search_ms(),
            stock_check_ms: d_stock_check_ms(),
            tts_first_chunk_ms: d_tts_first_chunk_ms(),
            order_sink_ms: d_order_sink_ms(),
            outbound_drain_on_cancel_ms: d_outbound_drain_ms(),
            reaper_interval_secs: d_reaper_interval_secs(),
            reaper_stale_after_secs: d_reaper_stale_after_secs(),
        }
    }
}

/// CatalogIndex.search's k/minScore and the fuzzy-fallback acceptance score (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogThresholds {
    #[serde(default = "c_min_score")]
    pub min_score: f32,
    #[serde(default = "c_fuzzy_fallback_score")]
    pub fuzzy_fallback_score: f32,
    #[serde(default = "c_search_k")]
    pub search_k: usize,
}

fn c_min_score() -> f32 {
    catalog::MIN_SCORE
}
fn c_fuzzy_fallback_score() -> f32 {
    catalog::FUZZY_FALLBACK_SCORE
}
fn c_search_k() -> usize {
    catalog::SEARCH_K
}

impl Default for CatalogThresholds {
    fn default() -> Self {
        Self {
            min_score: c_min_score(),
            fuzzy_fallback_score: c_fuzzy_fallback_score(),
            search_k: c_search_k(),
        }
    }
}

/// The confidence floors, escalation band and quantity bounds of §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueThresholds {
    #[serde(default = "dt_greeting_floor")]
    pub greeting_floor: f32,
    #[serde(default = "dt_clarifying_floor")]
    pub clarifying_floor: f32,
    #[serde(default = "dt_additive_floor")]
    pub additive_floor: f32,
    #[serde(default = "dt_low_confidence_threshold")]
    pub low_confidence_threshold: f32,
    #[serde(default = "dt_escalation_confidence_upper")]
    pub escalation_confidence_upper: f32,
    #[serde(default = "dt_escalation_attempts_ceiling")]
    pub escalation_attempts_ceiling: u32,
    #[serde(default = "dt_min_quantity")]
    pub min_quantity: i64,
    #[serde(default = "dt_max_quantity")]
    pub max_quantity: i64,
}

fn dt_greeting_floor() -> f32 {
    dialogue::GREETING_FLOOR
}
fn dt_clarifying_floor() -> f32 {
    dialogue::CLARIFYING_FLOOR
}
fn dt_additive_floor() -> f32 {
    dialogue::ADDITIVE_FLOOR
}
fn dt_low_confidence_threshold() -> f32 {
    dialogue::LOW_CONFIDENCE_THRESHOLD
}
fn dt_escalation_confidence_upper() -> f32 {
    dialogue::ESCALATION_CONFIDENCE_UPPER
}
fn dt_escalation_attempts_ceiling() -> u32 {
    dialogue::ESCALATION_ATTEMPTS_CEILING
}
fn dt_min_quantity() -> i64 {
    dialogue::MIN_QUANTITY
}
fn dt_max_quantity() -> i64 {
    dialogue::MAX_QUANTITY
}

impl Default for DialogueThresholds {
    fn default() -> Self {
        Self {
            greeting_floor: dt_greeting_floor(),
            clarifying_floor: dt_clarifying_floor(),
            additive_floor: dt_additive_floor(),
            low_confidence_threshold: dt_low_confidence_threshold(),
            escalation_confidence_upper: dt_escalation_confidence_upper(),
            escalation_attempts_ceiling: dt_escalation_attempts_ceiling(),
            min_quantity: dt_min_quantity(),
            max_quantity: dt_max_quantity(),
        }
    }
}

/// §4.10's review triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReviewThresholds {
    #[serde(default = "or_total_amount_threshold")]
    pub total_amount_threshold: f64,
    #[serde(default = "or_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn or_total_amount_threshold() -> f64 {
    order_review::TOTAL_AMOUNT_THRESHOLD
}
fn or_confidence_threshold() -> f32 {
    order_review::CONFIDENCE_THRESHOLD
}

impl Default for OrderReviewThresholds {
    fn default() -> Self {
        Self {
            total_amount_threshold: or_total_amount_threshold(),
            confidence_threshold: or_confidence_threshold(),
        }
    }
}

/// One provider's endpoint and credential. Credentials are never defaulted to
/// a literal value — they come from environment secrets or are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointCredential {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub stt: EndpointCredential,
    #[serde(default)]
    pub llm: EndpointCredential,
    #[serde(default)]
    pub tts: EndpointCredential,
    #[serde(default = "p_catalog")]
    pub catalog: EndpointCredential,
}

fn p_catalog() -> EndpointCredential {
    EndpointCredential {
        endpoint: crate::constants::endpoints::QDRANT_DEFAULT.clone(),
        api_key: None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
}

fn default_scylla_hosts() -> Vec<String> {
    crate::constants::endpoints::SCYLLA_DEFAULT
        .split(',')
        .map(|h| h.trim().to_string())
        .collect()
}

fn default_scylla_keyspace() -> String {
    "voice_agent".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

/// Loads `Settings` from compiled-in defaults, `config/{default,<env>}.{toml,yaml}`,
/// then `VOICE_AGENT__`-prefixed environment variables, in ascending priority.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));
    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut settings = Settings::default();
        settings.server.max_concurrent_calls = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn out_of_range_confidence_floor_fails_validation() {
        let mut settings = Settings::default();
        settings.dialogue_thresholds.greeting_floor = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn inverted_quantity_bounds_fail_validation() {
        let mut settings = Settings::default();
        settings.dialogue_thresholds.min_quantity = 2000;
        settings.dialogue_thresholds.max_quantity = 1000;
        assert!(settings.validate().is_err());
    }
}
