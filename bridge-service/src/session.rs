//! Session manager.
//!
//! Owns the authenticate-or-reuse decision for every target. A target moves
//! through `NO_SESSION -> AUTHENTICATING -> ACTIVE -> (EXPIRED | INVALIDATED)
//! -> NO_SESSION`; ACTIVE is exactly "a live entry in the credential cache".
//!
//! Authentication is serialized per target: callers racing for the same
//! target queue on a per-target lock and the losers pick up the token the
//! winner stored instead of opening a second session.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use common::errors::{AppError, AppResult};

use crate::cache::TtlCache;
use crate::data_api::DataApi;
use crate::registry::TargetRegistry;

/// Live session of one target.
#[derive(Clone)]
pub struct SessionEntry {
    /// Target the session belongs to.
    pub target_id: String,
    /// Opaque session token.
    pub token: String,
    /// When the session was opened.
    pub obtained_at: DateTime<Utc>,
}

impl fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEntry")
            .field("target_id", &self.target_id)
            .field("token", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Session tokens keyed by target id.
pub type CredentialCache = TtlCache<String, SessionEntry>;

/// Token-free view of a live session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    /// Target id.
    pub target_id: String,
    /// When the session was opened.
    pub obtained_at: DateTime<Utc>,
}

/// Hands out valid tokens per target.
pub struct SessionManager {
    registry: Arc<TargetRegistry>,
    credentials: Arc<CredentialCache>,
    api: Arc<dyn DataApi>,
    auth_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    /// Creates a manager over the given registry, cache and backend.
    pub fn new(
        registry: Arc<TargetRegistry>,
        credentials: Arc<CredentialCache>,
        api: Arc<dyn DataApi>,
    ) -> Self {
        Self {
            registry,
            credentials,
            api,
            auth_locks: DashMap::new(),
        }
    }

    /// Returns a live token for `target_id`, authenticating if needed.
    pub async fn get_token(&self, target_id: &str) -> AppResult<String> {
        if let Some(entry) = self.credentials.get(target_id) {
            return Ok(entry.token);
        }

        let target = self
            .registry
            .get(target_id)
            .ok_or_else(|| AppError::Authentication(format!("unknown target: {target_id}")))?;

        let lock = self.auth_lock(target_id);
        let _guard = lock.lock().await;

        // A caller holding the lock before us may already have stored a token.
        if let Some(entry) = self.credentials.get(target_id) {
            tracing::debug!(target_id, "Reusing session opened by a concurrent request");
            return Ok(entry.token);
        }

        tracing::debug!(target_id, credentials = target.credentials.kind(), "Opening session");
        let token = match self.api.authenticate(target).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(target_id, error = %e, "Authentication failed");
                return Err(e);
            }
        };

        self.credentials.set(
            target_id.to_string(),
            SessionEntry {
                target_id: target_id.to_string(),
                token: token.clone(),
                obtained_at: Utc::now(),
            },
        );
        tracing::info!(target_id, "Session opened");
        Ok(token)
    }

    /// Drops the cached session of `target_id` only if it still holds
    /// `rejected`. A token replaced by a concurrent re-authentication stays.
    /// No-op when there is no session.
    pub fn invalidate_rejected(&self, target_id: &str, rejected: &str) -> bool {
        let removed = self
            .credentials
            .delete_if(target_id, |entry| entry.token == rejected);
        if removed {
            tracing::info!(target_id, "Rejected session invalidated");
        }
        removed
    }

    /// Drops every cached session. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.credentials.clear()
    }

    /// Live sessions, sorted by target id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .credentials
            .snapshot()
            .into_iter()
            .map(|(_, entry)| SessionInfo {
                target_id: entry.target_id,
                obtained_at: entry.obtained_at,
            })
            .collect();
        sessions.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        sessions
    }

    fn auth_lock(&self, target_id: &str) -> Arc<Mutex<()>> {
        self.auth_locks
            .entry(target_id.to_string())
            .or_default()
            .clone()
    }
}
