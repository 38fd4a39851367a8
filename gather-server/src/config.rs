use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_WS_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_DATABASE_PATH: &str = "data/gather.db";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Server settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// REST listener
    pub http_addr: String,
    /// Real-time gateway listener
    pub ws_addr: String,
    /// SQLite file, or `:memory:`
    pub database_path: String,
    pub jwt_secret: String,
    /// Deadline for one store call
    pub store_timeout: Duration,
    /// Deadline for the WebSocket upgrade
    pub handshake_timeout: Duration,
    pub log_filter: String,
}

impl ServerConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let millis = |key: &str, default: u64| match lookup(key) {
            None => Duration::from_millis(default),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => Duration::from_millis(value),
                _ => {
                    warn!(key, value = %raw, default, "Invalid duration, using default");
                    Duration::from_millis(default)
                }
            },
        };

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let log_filter = lookup("GATHER_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            http_addr: text("GATHER_HTTP_ADDR", DEFAULT_HTTP_ADDR),
            ws_addr: text("GATHER_WS_ADDR", DEFAULT_WS_ADDR),
            database_path: text("GATHER_DATABASE_PATH", DEFAULT_DATABASE_PATH),
            jwt_secret,
            store_timeout: millis("GATHER_STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS),
            handshake_timeout: millis("GATHER_HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT_MS),
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:5000");
        assert_eq!(config.ws_addr, "0.0.0.0:9001");
        assert_eq!(config.database_path, "data/gather.db");
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_secret_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        assert!(load(&[("JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("JWT_SECRET", "s3cret"),
            ("GATHER_WS_ADDR", "127.0.0.1:7000"),
            ("GATHER_DATABASE_PATH", ":memory:"),
            ("GATHER_STORE_TIMEOUT_MS", "250"),
            ("RUST_LOG", "debug"),
            ("GATHER_LOG", "gather_server=trace"),
        ])
        .unwrap();
        assert_eq!(config.ws_addr, "127.0.0.1:7000");
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.log_filter, "gather_server=trace");
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = load(&[("JWT_SECRET", "s"), ("GATHER_STORE_TIMEOUT_MS", "soon")]).unwrap();
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
    }
}
