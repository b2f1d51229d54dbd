//! Target profile models.
//!
//! A target is one backend database reachable through the Data API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Transport protocol of the Data API endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unsupported protocol: {other}")),
        }
    }
}

/// Credentials used to open a session on a target.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Account name and password, sent as HTTP basic auth.
    UsernamePassword {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// Pre-issued api key, sent as a bearer token.
    ApiKey(String),
}

impl Credentials {
    /// Short label of the credential kind, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::UsernamePassword { .. } => "username_password",
            Credentials::ApiKey(_) => "api_key",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
        }
    }
}

/// Connection profile of one target. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    /// Logical identifier derived from the configuration suffix.
    pub id: String,
    /// Host name, optionally with a port.
    pub host: String,
    /// Database (file) name on the host.
    pub database: String,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Version segment of the API path.
    pub api_version: String,
    /// Session credentials.
    pub credentials: Credentials,
}

impl TargetProfile {
    /// Base URL of the host, e.g. `https://db.example.com`.
    pub fn endpoint(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }

    /// Public view of the profile, without credentials.
    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            id: self.id.clone(),
            host: self.host.clone(),
            database: self.database.clone(),
        }
    }
}

/// Target as shown to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TargetSummary {
    /// Target identifier.
    pub id: String,
    /// Host name.
    pub host: String,
    /// Database name.
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let profile = TargetProfile {
            id: "sales".into(),
            host: "db.example.com".into(),
            database: "Sales".into(),
            protocol: Protocol::Https,
            api_version: "vLatest".into(),
            credentials: Credentials::UsernamePassword {
                username: "admin".into(),
                password: "hunter2".into(),
            },
        };
        let rendered = format!("{profile:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));

        let key = format!("{:?}", Credentials::ApiKey("k-123".into()));
        assert!(!key.contains("k-123"));
    }

    #[test]
    fn test_endpoint_and_protocol_parsing() {
        assert_eq!("HTTPS".parse::<Protocol>(), Ok(Protocol::Https));
        assert!("ftp".parse::<Protocol>().is_err());

        let profile = TargetProfile {
            id: "a".into(),
            host: "localhost:8443".into(),
            database: "A".into(),
            protocol: Protocol::Http,
            api_version: "v1".into(),
            credentials: Credentials::ApiKey("k".into()),
        };
        assert_eq!(profile.endpoint(), "http://localhost:8443");
    }
}
