//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use course_forge_core::Stage;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service runs on in-memory stores.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub llm_model: String,
    pub llm_fast_model: String,
    /// Pause between a stage's `complete` event and the next stage's first event.
    pub chain_delay: Duration,
    /// Stages whose completion starts the following stage automatically.
    pub auto_advance: HashSet<Stage>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load LLM Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_base_url = std::env::var("OPENAI_BASE_URL").ok();
        let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let llm_fast_model =
            std::env::var("LLM_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        // --- Load Pipeline Settings ---
        let chain_delay_ms = std::env::var("CHAIN_DELAY_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue("CHAIN_DELAY_MS".to_string(), e.to_string()))?;

        let auto_advance = parse_stage_list(
            &std::env::var("STAGE_AUTO_ADVANCE").unwrap_or_else(|_| "research,design".to_string()),
        )
        .map_err(|e| ConfigError::InvalidValue("STAGE_AUTO_ADVANCE".to_string(), e))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_base_url,
            llm_model,
            llm_fast_model,
            chain_delay: Duration::from_millis(chain_delay_ms),
            auto_advance,
        })
    }
}

/// Parses a comma-separated stage list such as `research,design`.
pub fn parse_stage_list(raw: &str) -> Result<HashSet<Stage>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Stage>)
        .collect()
}
