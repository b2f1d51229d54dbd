//! Application state for the bridge service.
//!
//! Built once at startup and shared by every handler. Owns the registry,
//! both caches, the session manager, the executor and the tool service.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use common::config::AppConfig;
use common::errors::AppResult;

use crate::data_api::{DataApi, HttpDataApi};
use crate::executor::{RequestExecutor, ResultCache};
use crate::registry::TargetRegistry;
use crate::service::{BridgeService, BridgeServiceTrait};
use crate::session::{CredentialCache, SessionManager};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<TargetRegistry>,
    pub credentials: Arc<CredentialCache>,
    pub results: Arc<ResultCache>,
    pub sessions: Arc<SessionManager>,
    pub service: Arc<dyn BridgeServiceTrait>,
}

impl AppState {
    /// Wires every component around the given Data API client.
    pub fn new(config: AppConfig, registry: TargetRegistry, api: Arc<dyn DataApi>) -> Self {
        let registry = Arc::new(registry);
        let credentials = Arc::new(CredentialCache::new("sessions", config.session_ttl()));
        let results = Arc::new(ResultCache::new("results", config.data_ttl()));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            credentials.clone(),
            api.clone(),
        ));
        let executor = Arc::new(RequestExecutor::new(
            registry.clone(),
            sessions.clone(),
            results.clone(),
            api,
        ));
        let service: Arc<dyn BridgeServiceTrait> = Arc::new(BridgeService::new(
            registry.clone(),
            sessions.clone(),
            executor,
        ));

        Self {
            config,
            registry,
            credentials,
            results,
            sessions,
            service,
        }
    }

    /// Discovers targets from `vars` and connects them to the HTTP client.
    ///
    /// Fails with a configuration error when no target is usable.
    pub fn from_config(config: AppConfig, vars: &HashMap<String, String>) -> AppResult<Self> {
        let registry = TargetRegistry::discover(vars, &config.data_api)?;
        let api = HttpDataApi::new(config.request_timeout(), config.data_api.verify_ssl)?;
        Ok(Self::new(config, registry, Arc::new(api)))
    }

    /// Starts the periodic expiry sweep of both caches.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        let interval = self.config.cache_check_interval();
        vec![
            self.credentials.spawn_sweeper(interval),
            self.results.spawn_sweeper(interval),
        ]
    }
}
