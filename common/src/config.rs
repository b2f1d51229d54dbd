//! Process configuration.
//!
//! Everything is read from a flat key/value snapshot of the environment so
//! that parsing stays a pure function and tests can pass their own maps.

use std::collections::HashMap;
use std::time::Duration;

use crate::models::target::Protocol;

/// Default session cache lifetime: 14 minutes, one below the backend's 15.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 840;
/// Default result cache lifetime.
pub const DEFAULT_DATA_TTL_SECS: u64 = 3600;
/// Default interval of the background expiry sweep.
pub const DEFAULT_CACHE_CHECK_INTERVAL_SECS: u64 = 60;
/// Session lifetime enforced by the backend itself.
pub const DEFAULT_BACKEND_SESSION_TIMEOUT_SECS: u64 = 900;
/// Default bound for a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings shared by every target of the remote Data API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataApiSettings {
    /// `http` or `https`.
    pub protocol: Protocol,
    /// Version segment of the API path, e.g. `vLatest` or `v1`.
    pub api_version: String,
    /// Whether TLS certificates are verified.
    pub verify_ssl: bool,
}

impl Default for DataApiSettings {
    fn default() -> Self {
        Self {
            protocol: Protocol::Https,
            api_version: "vLatest".to_string(),
            verify_ssl: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the running service, used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Global Data API settings.
    pub data_api: DataApiSettings,
    /// Credential cache TTL in seconds, always below the backend window.
    pub session_ttl_secs: u64,
    /// Configured session TTL when it had to be lowered, for the startup log.
    pub session_ttl_clamped_from: Option<u64>,
    /// Result cache TTL in seconds.
    pub data_ttl_secs: u64,
    /// Background sweep interval in seconds.
    pub cache_check_interval_secs: u64,
    /// The backend's own session expiry window in seconds.
    pub backend_session_timeout_secs: u64,
    /// Timeout of a single remote call in seconds.
    pub request_timeout_secs: u64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Builds configuration from a key/value snapshot.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_vars(service: &str, vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let num = |key: &str, default: u64| {
            get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let data_api = DataApiSettings {
            protocol: get("DATA_API_PROTOCOL")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Protocol::Https),
            api_version: get("DATA_API_VERSION").unwrap_or("vLatest").to_string(),
            verify_ssl: get("DATA_API_VERIFY_SSL").map(parse_bool).unwrap_or(true),
        };

        let backend_session_timeout_secs = num(
            "BACKEND_SESSION_TIMEOUT_SECS",
            DEFAULT_BACKEND_SESSION_TIMEOUT_SECS,
        )
        .max(2);
        let requested_ttl = num("SESSION_CACHE_TTL_SECS", DEFAULT_SESSION_TTL_SECS);
        let session_ttl_secs = requested_ttl.min(backend_session_timeout_secs - 1);

        Self {
            service_name: service.to_string(),
            host: get("SERVER_HOST").unwrap_or("127.0.0.1").to_string(),
            port: get("SERVER_PORT").and_then(|v| v.parse().ok()).unwrap_or(8090),
            data_api,
            session_ttl_secs,
            session_ttl_clamped_from: (session_ttl_secs != requested_ttl).then_some(requested_ttl),
            data_ttl_secs: num("DATA_CACHE_TTL_SECS", DEFAULT_DATA_TTL_SECS),
            cache_check_interval_secs: num(
                "CACHE_CHECK_INTERVAL_SECS",
                DEFAULT_CACHE_CHECK_INTERVAL_SECS,
            )
            .max(1),
            backend_session_timeout_secs,
            request_timeout_secs: num("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            log_format: match get("LOG_FORMAT") {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    /// Credential cache TTL.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Result cache TTL.
    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_secs)
    }

    /// Background sweep interval.
    pub fn cache_check_interval(&self) -> Duration {
        Duration::from_secs(self.cache_check_interval_secs)
    }

    /// Remote call timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Snapshot of the process environment.
pub fn env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
