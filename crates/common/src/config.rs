//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config. Subsystems with their own
//! settings (cache, circuit breaker, LLM provider) expose a `from_env`
//! constructor in their own crate and reuse the parsing helpers below.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Log output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!(
                "Unknown LOG_FORMAT: {}. Supported formats: pretty, json",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL (PostgreSQL)
    pub database_url: String,

    /// Maximum connections held by the pool
    pub database_max_connections: u32,

    /// Runtime configuration
    pub rust_log: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),

            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "thicode=debug,info".to_string()),
            log_format: env::var("LOG_FORMAT")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(config)
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or unparsable.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
