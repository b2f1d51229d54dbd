//! Target registry.
//!
//! Targets are discovered from a flat configuration namespace where every
//! key carries the target id as its suffix:
//!
//! ```text
//! TARGET_HOST_SALES=db.example.com
//! TARGET_DATABASE_SALES=Sales
//! TARGET_USERNAME_SALES=api
//! TARGET_PASSWORD_SALES=...
//! TARGET_API_KEY_HR=...
//! ```
//!
//! Each candidate is validated on its own and silently dropped when
//! incomplete. Discovery only fails when nothing survives.

use std::collections::{BTreeMap, HashMap};

use common::config::DataApiSettings;
use common::errors::{AppError, AppResult};
use common::models::target::{Credentials, TargetProfile, TargetSummary};

const HOST_PREFIX: &str = "TARGET_HOST_";
const DATABASE_PREFIX: &str = "TARGET_DATABASE_";
const USERNAME_PREFIX: &str = "TARGET_USERNAME_";
const PASSWORD_PREFIX: &str = "TARGET_PASSWORD_";
const API_KEY_PREFIX: &str = "TARGET_API_KEY_";

// API_KEY must be matched before the shorter prefixes that could shadow it.
const PREFIXES: [&str; 5] = [
    API_KEY_PREFIX,
    DATABASE_PREFIX,
    USERNAME_PREFIX,
    PASSWORD_PREFIX,
    HOST_PREFIX,
];

/// Immutable mapping of target id to profile.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: BTreeMap<String, TargetProfile>,
}

#[derive(Default)]
struct Candidate<'a> {
    host: Option<&'a str>,
    database: Option<&'a str>,
    username: Option<&'a str>,
    password: Option<&'a str>,
    api_key: Option<&'a str>,
}

impl TargetRegistry {
    /// Builds the registry from a configuration snapshot.
    pub fn discover(
        vars: &HashMap<String, String>,
        settings: &DataApiSettings,
    ) -> AppResult<Self> {
        let mut candidates: BTreeMap<String, Candidate<'_>> = BTreeMap::new();

        for (key, value) in vars {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let Some((prefix, suffix)) = PREFIXES
                .iter()
                .find_map(|p| key.strip_prefix(p).map(|s| (*p, s)))
            else {
                continue;
            };
            if suffix.is_empty() {
                continue;
            }
            let entry = candidates.entry(suffix.to_ascii_lowercase()).or_default();
            let slot = match prefix {
                HOST_PREFIX => &mut entry.host,
                DATABASE_PREFIX => &mut entry.database,
                USERNAME_PREFIX => &mut entry.username,
                PASSWORD_PREFIX => &mut entry.password,
                _ => &mut entry.api_key,
            };
            *slot = Some(value);
        }

        let mut targets = BTreeMap::new();
        for (id, candidate) in candidates {
            match build_profile(&id, &candidate, settings) {
                Ok(profile) => {
                    tracing::info!(
                        target_id = %id,
                        host = %profile.host,
                        database = %profile.database,
                        credentials = profile.credentials.kind(),
                        "Target registered"
                    );
                    targets.insert(id, profile);
                }
                Err(missing) => {
                    tracing::warn!(target_id = %id, missing = ?missing, "Incomplete target skipped");
                }
            }
        }

        if targets.is_empty() {
            return Err(AppError::Configuration(
                "no valid targets configured (need TARGET_HOST_<ID>, TARGET_DATABASE_<ID> and \
                 TARGET_USERNAME_<ID>+TARGET_PASSWORD_<ID> or TARGET_API_KEY_<ID>)"
                    .to_string(),
            ));
        }

        Ok(Self { targets })
    }

    /// Looks up a profile by id.
    pub fn get(&self, id: &str) -> Option<&TargetProfile> {
        self.targets.get(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    /// Credential-free view of every target.
    pub fn summaries(&self) -> Vec<TargetSummary> {
        self.targets.values().map(TargetProfile::summary).collect()
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry is empty. Never true for a discovered registry.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FromIterator<TargetProfile> for TargetRegistry {
    fn from_iter<I: IntoIterator<Item = TargetProfile>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

fn build_profile(
    id: &str,
    candidate: &Candidate<'_>,
    settings: &DataApiSettings,
) -> Result<TargetProfile, Vec<&'static str>> {
    let mut missing = Vec::new();
    if candidate.host.is_none() {
        missing.push("host");
    }
    if candidate.database.is_none() {
        missing.push("database");
    }

    let credentials = match (candidate.username, candidate.password, candidate.api_key) {
        (Some(username), Some(password), _) => Some(Credentials::UsernamePassword {
            username: username.to_string(),
            password: password.to_string(),
        }),
        (_, _, Some(key)) => Some(Credentials::ApiKey(key.to_string())),
        _ => None,
    };
    if credentials.is_none() {
        missing.push("credentials");
    }

    match (candidate.host, candidate.database, credentials) {
        (Some(host), Some(database), Some(credentials)) => Ok(TargetProfile {
            id: id.to_string(),
            host: host.trim_end_matches('/').to_string(),
            database: database.to_string(),
            protocol: settings.protocol,
            api_version: settings.api_version.clone(),
            credentials,
        }),
        _ => Err(missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_drops_target_without_any_credential() {
        let registry = TargetRegistry::discover(
            &vars(&[
                ("TARGET_HOST_SALES", "db1.example.com"),
                ("TARGET_DATABASE_SALES", "Sales"),
                ("TARGET_USERNAME_SALES", "api"),
                ("TARGET_PASSWORD_SALES", "secret"),
                ("TARGET_HOST_HR", "db2.example.com"),
                ("TARGET_DATABASE_HR", "HR"),
                ("TARGET_API_KEY_HR", "key-1"),
                ("TARGET_HOST_OPS", "db3.example.com"),
                ("TARGET_DATABASE_OPS", "Ops"),
                ("TARGET_USERNAME_OPS", "api"),
            ]),
            &DataApiSettings::default(),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["hr".to_string(), "sales".to_string()]);
        assert!(registry.get("ops").is_none());
        assert!(matches!(
            registry.get("hr").unwrap().credentials,
            Credentials::ApiKey(_)
        ));
    }

    #[test]
    fn test_requires_host_and_database() {
        let result = TargetRegistry::discover(
            &vars(&[
                ("TARGET_DATABASE_A", "A"),
                ("TARGET_API_KEY_A", "k"),
                ("TARGET_HOST_B", "b.example.com"),
                ("TARGET_DATABASE_B", "  "),
                ("TARGET_API_KEY_B", "k"),
            ]),
            &DataApiSettings::default(),
        );
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_empty_configuration_is_fatal() {
        let result = TargetRegistry::discover(&HashMap::new(), &DataApiSettings::default());
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_password_credentials_win_over_api_key() {
        let registry = TargetRegistry::discover(
            &vars(&[
                ("TARGET_HOST_A", "a.example.com/"),
                ("TARGET_DATABASE_A", "A"),
                ("TARGET_USERNAME_A", "u"),
                ("TARGET_PASSWORD_A", "p"),
                ("TARGET_API_KEY_A", "k"),
                ("UNRELATED", "x"),
            ]),
            &DataApiSettings::default(),
        )
        .unwrap();
        let profile = registry.get("a").unwrap();
        assert_eq!(profile.host, "a.example.com");
        assert_eq!(profile.credentials.kind(), "username_password");
        assert_eq!(profile.api_version, "vLatest");
    }
}
