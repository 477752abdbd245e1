// src/config.rs
use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::groq_client::DEFAULT_GROQ_BASE_URL;
use crate::relay::RelaySettings;

const DEV_JWT_SECRET: &str = "faraja-development-secret-change-me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub groq: GroqConfig,
    pub relay: RelaySettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = RelaySettings::default();

        let store_backend = match get("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = get("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            store_backend,
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            jwt_ttl_hours: parse_or(&get, "JWT_TTL_HOURS", 24)?,
            groq: GroqConfig {
                api_key: get("GROQ_API_KEY"),
                base_url: get("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
                timeout: Duration::from_secs(parse_or(&get, "GROQ_TIMEOUT_SECS", 120)?),
            },
            relay: RelaySettings {
                model: get("GROQ_MODEL").unwrap_or(defaults.model),
                temperature: parse_or(&get, "GROQ_TEMPERATURE", defaults.temperature)?,
                max_tokens: parse_or(&get, "GROQ_MAX_TOKENS", defaults.max_tokens)?,
                channel_capacity: parse_or(
                    &get,
                    "RELAY_CHANNEL_CAPACITY",
                    defaults.channel_capacity,
                )?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
