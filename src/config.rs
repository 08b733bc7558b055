//! Process configuration read from environment variables.

use std::time::Duration;

use crate::error::ConfigError;
use crate::response::JSONAPI_MEDIA_TYPE;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// In-memory store when `None`.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_retry: Duration,
    /// 0 retries forever.
    pub db_connect_attempts: u32,
    pub max_body_bytes: usize,
    pub api_token: Option<String>,
    pub accepted_content_types: Vec<String>,
    /// `*` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    pub firewall_only: Vec<String>,
    pub firewall_except: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            database_url: None,
            db_max_connections: 5,
            db_connect_retry: Duration::from_millis(1000),
            db_connect_attempts: 0,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            api_token: None,
            accepted_content_types: vec![
                JSONAPI_MEDIA_TYPE.to_owned(),
                format!("{JSONAPI_MEDIA_TYPE}; charset=UTF-8"),
                format!("{JSONAPI_MEDIA_TYPE}; charset=utf-8"),
            ],
            cors_allowed_origins: vec!["*".to_owned()],
            firewall_only: vec!["^/shows".to_owned()],
            firewall_except: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut config = ServerConfig::default();

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = get("DATABASE_URL");
        if let Some(raw) = get("DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_number("DB_MAX_CONNECTIONS", &raw)?;
            if config.db_max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: "DB_MAX_CONNECTIONS",
                    value: raw,
                });
            }
        }
        if let Some(raw) = get("DB_CONNECT_RETRY_MS") {
            config.db_connect_retry = Duration::from_millis(parse_number("DB_CONNECT_RETRY_MS", &raw)?);
        }
        if let Some(raw) = get("DB_CONNECT_ATTEMPTS") {
            config.db_connect_attempts = parse_number("DB_CONNECT_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("MAX_BODY_BYTES") {
            config.max_body_bytes = parse_number("MAX_BODY_BYTES", &raw)?;
        }
        config.api_token = get("API_TOKEN");
        if let Some(raw) = get("ACCEPTED_CONTENT_TYPES") {
            config.accepted_content_types = split_list(&raw);
            if config.accepted_content_types.is_empty() {
                return Err(ConfigError::Empty {
                    key: "ACCEPTED_CONTENT_TYPES",
                });
            }
        }
        if let Some(raw) = get("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = split_list(&raw);
        }
        // Set but blank clears the list.
        if let Some(raw) = lookup("FIREWALL_ONLY") {
            config.firewall_only = split_list(&raw);
        }
        if let Some(raw) = lookup("FIREWALL_EXCEPT") {
            config.firewall_except = split_list(&raw);
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c, ServerConfig::default());
        assert_eq!(c.bind_addr, "0.0.0.0:8080");
        assert!(c.database_url.is_none());
        assert_eq!(c.firewall_only, vec!["^/shows"]);
        assert_eq!(c.accepted_content_types.len(), 3);
        assert_eq!(c.cors_allowed_origins, vec!["*"]);
    }

    #[test]
    fn reads_values_and_lists() {
        let c = config(&[
            ("DATABASE_URL", "postgres://localhost/shows"),
            ("DB_CONNECT_RETRY_MS", "250"),
            ("API_TOKEN", " secret "),
            ("FIREWALL_ONLY", ""),
            ("FIREWALL_EXCEPT", "^/health, ^/public"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/shows"));
        assert_eq!(c.db_connect_retry, Duration::from_millis(250));
        assert_eq!(c.api_token.as_deref(), Some("secret"));
        assert!(c.firewall_only.is_empty());
        assert_eq!(c.firewall_except, vec!["^/health", "^/public"]);
        assert_eq!(c.cors_allowed_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("MAX_BODY_BYTES", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_BODY_BYTES", .. }));
        let err = config(&[("DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
        let err = config(&[("ACCEPTED_CONTENT_TYPES", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }
}
