use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::transport::ReconnectPolicy;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_SOCKET_PATH: &str = "/ws/socket.io";

pub const ENV_API_BASE_URL: &str = "HMS_API_BASE_URL";
pub const ENV_SOCKET_URL: &str = "HMS_SOCKET_URL";
pub const ENV_SOCKET_PATH: &str = "HMS_SOCKET_PATH";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "HMS_REQUEST_TIMEOUT_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "HMS_CONNECT_TIMEOUT_MS";
pub const ENV_RECONNECT_MAX_ATTEMPTS: &str = "HMS_RECONNECT_MAX_ATTEMPTS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0} cannot be empty")]
    Empty(&'static str),
    #[error("config error: invalid url for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("config error: {field} must be a positive integer, got '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("config error: {0} must be greater than 0")]
    ZeroTimeout(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Origin of the Socket.IO server. Derived from `api_base_url` when unset.
    #[serde(default)]
    pub socket_url: Option<String>,
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            socket_url: None,
            socket_path: default_socket_path(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Build a config from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(error) = dotenvy::dotenv() {
            if !error.not_found() {
                tracing::warn!("failed to load .env file: {error}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = get(ENV_API_BASE_URL) {
            config.api_base_url = value;
        }
        config.socket_url = get(ENV_SOCKET_URL);
        if let Some(value) = get(ENV_SOCKET_PATH) {
            config.socket_path = value;
        }
        if let Some(value) = get(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout_ms = parse_number("request_timeout_ms", &value)?;
        }
        if let Some(value) = get(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout_ms = parse_number("connect_timeout_ms", &value)?;
        }
        if let Some(value) = get(ENV_RECONNECT_MAX_ATTEMPTS) {
            config.reconnect.max_attempts = parse_number("reconnect.max_attempts", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Empty("api_base_url"));
        }
        parse_http_url("api_base_url", &self.api_base_url)?;
        if let Some(socket_url) = &self.socket_url {
            parse_http_url("socket_url", socket_url)?;
        }
        if self.socket_path.trim().is_empty() {
            return Err(ConfigError::Empty("socket_path"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("request_timeout_ms"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_ms"));
        }
        Ok(())
    }

    /// The Socket.IO origin: `socket_url` if set, otherwise the origin of `api_base_url`.
    pub fn socket_origin(&self) -> Result<String, ConfigError> {
        if let Some(socket_url) = &self.socket_url {
            return Ok(socket_url.trim_end_matches('/').to_string());
        }
        let url = parse_http_url("api_base_url", &self.api_base_url)?;
        Ok(url.origin().ascii_serialization())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|error| ConfigError::InvalidUrl {
        field,
        reason: error.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}
