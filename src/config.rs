//! Configuration management for goal-agents.
//!
//! Configuration can be set via environment variables:
//! - `AGENT_ENCRYPTION_SECRET` - Required. Secret the credential vault key is derived from.
//! - `DATABASE_PATH` - Optional. SQLite file for agents and credentials. Defaults to `./data/goal-agents.db`.
//! - `GEMINI_API_KEY` - Optional. Enables the chat service when set.
//! - `GENERATION_MODELS` - Optional. Comma-separated model ring, primary first.
//! - `GENERATION_RETRY_DELAY_MS` - Optional. Pause between ring attempts. Defaults to `500`.
//! - `RAPIDAPI_KEY` - Optional. Shared key for every RapidAPI-hosted provider.
//! - `HTTP_TIMEOUT_SECS` - Optional. Timeout for provider and model requests. Defaults to `30`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::agents::SharedKeys;
use crate::providers::RAPIDAPI;

const DEFAULT_DATABASE_PATH: &str = "./data/goal-agents.db";
const DEFAULT_MODELS: &str = "gemini-2.0-flash,gemini-1.5-flash,gemini-1.5-flash-8b";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Process configuration.
#[derive(Clone)]
pub struct Config {
    /// Vault secret; never logged
    pub encryption_secret: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Gemini API key; chat is disabled without it
    pub gemini_api_key: Option<String>,

    /// Generation ring, primary model first
    pub generation_models: Vec<String>,

    /// Pause between two ring attempts
    pub generation_retry_delay: Duration,

    /// Shared RapidAPI key
    pub rapidapi_key: Option<String>,

    /// HTTP timeout for providers and models
    pub http_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("encryption_secret", &"<redacted>")
            .field("database_path", &self.database_path)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("generation_models", &self.generation_models)
            .field("generation_retry_delay", &self.generation_retry_delay)
            .field("rapidapi_key", &self.rapidapi_key.as_ref().map(|_| "<redacted>"))
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `AGENT_ENCRYPTION_SECRET` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any key-value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let encryption_secret = get("AGENT_ENCRYPTION_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("AGENT_ENCRYPTION_SECRET".to_string()))?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let generation_models =
            parse_models(&get("GENERATION_MODELS").unwrap_or_else(|| DEFAULT_MODELS.to_string()));
        if generation_models.is_empty() {
            return Err(ConfigError::InvalidValue(
                "GENERATION_MODELS".to_string(),
                "no model identifiers".to_string(),
            ));
        }

        let retry_delay_ms: u64 = get("GENERATION_RETRY_DELAY_MS")
            .unwrap_or_else(|| "500".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("GENERATION_RETRY_DELAY_MS".to_string(), format!("{}", e))
            })?;

        let timeout_secs: u64 = get("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("HTTP_TIMEOUT_SECS".to_string(), format!("{}", e)))?;

        Ok(Self {
            encryption_secret,
            database_path,
            gemini_api_key: get("GEMINI_API_KEY"),
            generation_models,
            generation_retry_delay: Duration::from_millis(retry_delay_ms),
            rapidapi_key: get("RAPIDAPI_KEY"),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(encryption_secret: String, database_path: PathBuf) -> Self {
        Self {
            encryption_secret,
            database_path,
            gemini_api_key: None,
            generation_models: parse_models(DEFAULT_MODELS),
            generation_retry_delay: Duration::from_millis(500),
            rapidapi_key: None,
            http_timeout: Duration::from_secs(30),
        }
    }

    /// Aggregator keys handed to every agent.
    pub fn shared_keys(&self) -> SharedKeys {
        let mut keys = HashMap::new();
        if let Some(key) = &self.rapidapi_key {
            keys.insert(RAPIDAPI.to_string(), key.clone());
        }
        SharedKeys::new(keys)
    }
}

fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[("AGENT_ENCRYPTION_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.database_path, PathBuf::from("./data/goal-agents.db"));
        assert_eq!(config.generation_models.len(), 3);
        assert_eq!(config.generation_models[0], "gemini-2.0-flash");
        assert_eq!(config.generation_retry_delay, Duration::from_millis(500));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.gemini_api_key.is_none());
        assert!(config.shared_keys().get(RAPIDAPI).is_none());
    }

    #[test]
    fn test_missing_secret() {
        let err = Config::from_lookup(lookup(&[("AGENT_ENCRYPTION_SECRET", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "AGENT_ENCRYPTION_SECRET"));
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let config = Config::from_lookup(lookup(&[
            ("AGENT_ENCRYPTION_SECRET", "s"),
            ("GENERATION_MODELS", " a , ,b "),
            ("GENERATION_RETRY_DELAY_MS", "20"),
            ("RAPIDAPI_KEY", "rk"),
        ]))
        .unwrap();
        assert_eq!(config.generation_models, vec!["a", "b"]);
        assert_eq!(config.generation_retry_delay, Duration::from_millis(20));
        assert_eq!(config.shared_keys().get(RAPIDAPI), Some("rk"));

        let err = Config::from_lookup(lookup(&[
            ("AGENT_ENCRYPTION_SECRET", "s"),
            ("HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::new("top-secret".into(), PathBuf::from("db.sqlite"));
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("top-secret"));
    }
}
