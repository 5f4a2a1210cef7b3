use std::env;
use std::path::PathBuf;
use std::time::Duration;

use intake_engine::case::DEFAULT_CASE_TYPE_ID;
use intake_engine::runner::DEFAULT_ENHANCER_TIMEOUT;
use intake_engine::store::{DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ENHANCER_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} is required when {1} is set")]
    Missing(&'static str, &'static str),
}

/// Service configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub log_format: LogFormat,
    pub enhancer: Option<EnhancerConfig>,
    pub sessions: SessionConfig,
    pub cases: CaseApiConfig,
    pub scoring_table_path: Option<PathBuf>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// LLM enhancer settings; present only when an API key is configured
#[derive(Debug, Clone)]
pub struct EnhancerConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

/// Case management endpoint. Without a URL, cases are issued offline.
#[derive(Debug, Clone)]
pub struct CaseApiConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub case_type_id: String,
}

impl ServiceConfig {
    /// Load configuration from the process environment and an optional `.env` file
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("pretty") => LogFormat::Pretty,
            Some("json") | None => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                });
            }
        };

        let enhancer = match var("OPENROUTER_API_KEY") {
            Some(api_key) => Some(EnhancerConfig {
                api_key,
                model: var("ENHANCER_MODEL").unwrap_or_else(|| DEFAULT_ENHANCER_MODEL.to_string()),
                timeout: parse_number(&var, "ENHANCER_TIMEOUT_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_ENHANCER_TIMEOUT),
            }),
            None => None,
        };

        let sessions = SessionConfig {
            ttl: parse_number(&var, "SESSION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SESSION_TTL),
            capacity: parse_number(&var, "SESSION_CAPACITY")?
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_SESSION_CAPACITY),
            sweep_interval: parse_number(&var, "SESSION_SWEEP_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        };

        let cases = CaseApiConfig {
            base_url: var("CASE_API_URL"),
            username: var("CASE_API_USERNAME"),
            password: var("CASE_API_PASSWORD"),
            case_type_id: var("CASE_TYPE_ID").unwrap_or_else(|| DEFAULT_CASE_TYPE_ID.to_string()),
        };
        if cases.username.is_some() && cases.password.is_none() {
            return Err(ConfigError::Missing("CASE_API_PASSWORD", "CASE_API_USERNAME"));
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            log_format,
            enhancer,
            sessions,
            cases,
            scoring_table_path: var("SCORING_TABLE_PATH").map(PathBuf::from),
        })
    }
}

fn parse_number<F>(var: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid { key, value })
        })
        .transpose()
}
