//! Application configuration via environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub port: u16,
    pub session_secret: String,
    pub session_https_only: bool,
    pub cookie_domain: Option<String>,
    /// Idle time after which an experiment session is evicted.
    pub experiment_timeout: Duration,
    /// Period of the background sweep; `None` means sweep on access only.
    pub sweep_interval: Option<Duration>,
    pub script_interpreter: String,
    pub script_call_timeout: Duration,
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `CATALOG_PATH`. All others have defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            catalog_path: required_env("CATALOG_PATH")?.into(),
            port: parsed_env("PORT", 5000)?,
            session_secret: env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".into()),
            session_https_only: env::var("SESSION_HTTPS_ONLY")
                .map(|v| v == "true" || v == "1" || v == "True")
                .unwrap_or(false),
            cookie_domain: env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
            experiment_timeout: Duration::from_secs(parsed_env("EXPERIMENT_TIMEOUT_SECS", 3600)?),
            sweep_interval: match parsed_env("SWEEP_INTERVAL_SECS", 0)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            script_interpreter: env::var("SCRIPT_INTERPRETER").unwrap_or_else(|_| "python3".into()),
            script_call_timeout: Duration::from_secs(parsed_env("SCRIPT_CALL_TIMEOUT_SECS", 30)?),
            log_json: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

/// Configuration for testing, all fields settable directly.
impl Config {
    pub fn test_default() -> Self {
        Self {
            catalog_path: PathBuf::from("catalog.json"),
            port: 5000,
            session_secret: "test-secret-key".into(),
            session_https_only: false,
            cookie_domain: None,
            experiment_timeout: Duration::from_secs(3600),
            sweep_interval: None,
            script_interpreter: "sh".into(),
            script_call_timeout: Duration::from_secs(5),
            log_json: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv(key.into()))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.into(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
