//! Layered configuration for the voice agent (SPEC_FULL §12).
//!
//! `Settings` is built from compiled-in defaults, an optional TOML/YAML file,
//! then environment variables under the `VOICE_AGENT__` prefix, in that
//! priority order (lowest to highest). Components read `Settings` directly;
//! nothing branches on `RuntimeEnvironment` at the call site.

pub mod constants;
pub mod settings;

pub use settings::{
    CatalogThresholds, DeadlineConfig, DialogueThresholds, OrderReviewThresholds,
    PersistenceConfig, ProviderConfig, RuntimeEnvironment, ServerConfig, Settings, load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
