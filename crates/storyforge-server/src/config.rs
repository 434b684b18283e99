// ABOUTME: Configuration loading and validation for the storyforge server.
// ABOUTME: Reads STORYFORGE_* environment variables and fails fast on invalid values.

use std::net::SocketAddr;

use thiserror::Error;

use storyforge_core::config::RunConfig;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STORYFORGE_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("STORYFORGE_QUALITY_THRESHOLD must be a number in [0, 1]: {0}")]
    InvalidThreshold(String),

    #[error("STORYFORGE_MAX_CLARIFICATION_ROUNDS must be a non-negative integer: {0}")]
    InvalidRounds(String),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub provider: String,
    pub model: Option<String>,
    pub quality_threshold: f64,
    pub max_clarification_rounds: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - STORYFORGE_BIND: socket address to bind (default: 127.0.0.1:8460)
    /// - STORYFORGE_PROVIDER: completion provider (default: openai)
    /// - STORYFORGE_MODEL: model identifier (optional; provider default applies)
    /// - STORYFORGE_QUALITY_THRESHOLD: refinement quality bar (default: 0.8)
    /// - STORYFORGE_MAX_CLARIFICATION_ROUNDS: refinement round cap (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RunConfig::default();

        let bind_str =
            std::env::var("STORYFORGE_BIND").unwrap_or_else(|_| "127.0.0.1:8460".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let provider =
            std::env::var("STORYFORGE_PROVIDER").unwrap_or_else(|_| "openai".to_string());

        let model = std::env::var("STORYFORGE_MODEL").ok().filter(|m| !m.is_empty());

        let quality_threshold = match std::env::var("STORYFORGE_QUALITY_THRESHOLD") {
            Ok(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|t| (0.0..=1.0).contains(t))
                .ok_or(ConfigError::InvalidThreshold(raw))?,
            Err(_) => defaults.quality_threshold,
        };

        let max_clarification_rounds = match std::env::var("STORYFORGE_MAX_CLARIFICATION_ROUNDS") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRounds(raw))?,
            Err(_) => defaults.max_clarification_rounds,
        };

        Ok(Self {
            bind,
            provider,
            model,
            quality_threshold,
            max_clarification_rounds,
        })
    }

    /// The per-run knobs derived from this server configuration.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            max_clarification_rounds: self.max_clarification_rounds,
            quality_threshold: self.quality_threshold,
        }
    }
}
