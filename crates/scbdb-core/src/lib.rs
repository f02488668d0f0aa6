//! Shared domain types and configuration for the SCBDB propagation engine.

pub mod app_config;
pub mod config;
pub mod entities;

pub use app_config::{
    CacheSettings, CriticalitySettings, EchoSettings, EngineConfig, GraphWeights,
    MonteCarloSettings, ProximityDecay, SignalSettings,
};
pub use config::{load_engine_config, load_engine_config_from_env};
pub use entities::{
    load_entities, validate_entities, Coordinates, EntitiesFile, EntityState, SENTIMENT_MAX,
    SENTIMENT_MIN,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read entities file {path}: {source}")]
    EntitiesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse entities file: {0}")]
    EntitiesFileParse(#[from] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}
