//! Request executor.
//!
//! Runs one remote request for a target:
//!
//! 1. cacheable requests are answered from the result cache when possible,
//!    without touching the session manager or the network;
//! 2. a token is obtained from the session manager;
//! 3. the call is issued at most [`MAX_ATTEMPTS`] times. Only an
//!    authorization rejection on the first attempt leads to a second one,
//!    after the session has been invalidated and a fresh token obtained.
//!
//! Mutating requests never read or write the result cache, whatever their
//! `cacheable` flag says.
//!
//! Transport-level successes are cached as returned, including payloads that
//! report an application-level error. Callers inspect the payload.

use std::sync::Arc;

use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::utils::CacheKey;

use crate::cache::TtlCache;
use crate::data_api::{DataApi, RemoteOutcome, RemoteRequest};
use crate::registry::TargetRegistry;
use crate::session::SessionManager;

/// Original attempt plus one retry after re-authentication.
pub const MAX_ATTEMPTS: usize = 2;

/// Read results keyed by operation, target and parameters.
pub type ResultCache = TtlCache<CacheKey, Value>;

/// Executes remote requests with caching and session recovery.
pub struct RequestExecutor {
    registry: Arc<TargetRegistry>,
    sessions: Arc<SessionManager>,
    results: Arc<ResultCache>,
    api: Arc<dyn DataApi>,
}

impl RequestExecutor {
    /// Creates an executor.
    pub fn new(
        registry: Arc<TargetRegistry>,
        sessions: Arc<SessionManager>,
        results: Arc<ResultCache>,
        api: Arc<dyn DataApi>,
    ) -> Self {
        Self {
            registry,
            sessions,
            results,
            api,
        }
    }

    /// Executes `request` against `target_id`.
    pub async fn execute(&self, target_id: &str, request: RemoteRequest) -> AppResult<Value> {
        let key = (request.cacheable && !request.kind.is_mutating())
            .then(|| CacheKey::new(request.kind, target_id, &request.cache_params));

        if let Some(key) = &key {
            if let Some(hit) = self.results.get(key) {
                tracing::debug!(target_id, operation = %request.kind, "Result cache hit");
                return Ok(hit);
            }
        }

        let target = self
            .registry
            .get(target_id)
            .ok_or_else(|| AppError::Authentication(format!("unknown target: {target_id}")))?;

        let mut token = self.sessions.get_token(target_id).await?;
        let mut attempt = 1;

        loop {
            match self.api.call(target, &token, &request).await {
                RemoteOutcome::Success(value) => {
                    if let Some(key) = key {
                        self.results.set(key, value.clone());
                    }
                    tracing::debug!(target_id, operation = %request.kind, attempt, "Remote call succeeded");
                    return Ok(value);
                }
                RemoteOutcome::AuthRejected(message) if attempt < MAX_ATTEMPTS => {
                    tracing::info!(
                        target_id,
                        operation = %request.kind,
                        reason = %message,
                        "Session rejected, re-authenticating"
                    );
                    // Only the rejected token is dropped; a session opened
                    // meanwhile by another request is reused as is.
                    self.sessions.invalidate_rejected(target_id, &token);
                    token = self.sessions.get_token(target_id).await?;
                    attempt += 1;
                }
                RemoteOutcome::AuthRejected(message) => {
                    tracing::warn!(
                        target_id,
                        operation = %request.kind,
                        reason = %message,
                        "Session rejected after re-authentication"
                    );
                    return Err(AppError::RequestFailed {
                        status: Some(401),
                        message,
                    });
                }
                RemoteOutcome::Failure(error) => {
                    tracing::warn!(target_id, operation = %request.kind, error = %error, "Remote call failed");
                    return Err(error);
                }
            }
        }
    }

    /// Drops every cached result. Returns how many were dropped.
    pub fn clear_results(&self) -> usize {
        self.results.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CredentialCache;
    use crate::testing::{profile, FakeDataApi};
    use common::models::tool::OperationKind;
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        api: Arc<FakeDataApi>,
        executor: RequestExecutor,
    }

    fn harness() -> Harness {
        harness_with(FakeDataApi::new())
    }

    fn harness_with(api: FakeDataApi) -> Harness {
        let api = Arc::new(api);
        let registry = Arc::new(TargetRegistry::from_iter([profile("sales")]));
        let credentials = Arc::new(CredentialCache::new("sessions", Duration::from_secs(840)));
        let results = Arc::new(ResultCache::new("results", Duration::from_secs(3600)));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            credentials,
            api.clone(),
        ));
        let executor = RequestExecutor::new(registry, sessions, results, api.clone());
        Harness { api, executor }
    }

    fn find(query: Value) -> RemoteRequest {
        RemoteRequest::read(
            OperationKind::FindRecords,
            Method::POST,
            "/layouts/Customers/_find".into(),
            json!({"layout": "Customers", "query": query.clone()}),
        )
        .with_body(json!({ "query": query }))
    }

    fn metadata() -> RemoteRequest {
        RemoteRequest::read(OperationKind::Metadata, Method::GET, "/layouts".into(), json!({}))
    }

    fn create() -> RemoteRequest {
        RemoteRequest::write(
            OperationKind::CreateRecord,
            Method::POST,
            "/layouts/Customers/records".into(),
        )
        .with_body(json!({"fieldData": {"Name": "Acme"}}))
    }

    fn unauthorized() -> RemoteOutcome {
        RemoteOutcome::AuthRejected("Invalid FileMaker Data API token (code 952)".into())
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_network() {
        let h = harness();
        let first = h.executor.execute("sales", metadata()).await.unwrap();
        let second = h.executor.execute("sales", metadata()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.api.data_calls(), 1);
        assert_eq!(h.api.auth_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_result_is_fetched_again() {
        let h = harness();
        h.executor.execute("sales", metadata()).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        h.executor.execute("sales", metadata()).await.unwrap();
        assert_eq!(h.api.data_calls(), 2);
    }

    #[tokio::test]
    async fn test_mutations_bypass_cache() {
        let h = harness();
        let first = h.executor.execute("sales", create()).await.unwrap();
        let second = h.executor.execute("sales", create()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.api.data_calls(), 2);
        assert!(h.executor.results.is_empty());
    }

    #[tokio::test]
    async fn test_mutating_kind_is_never_cached_even_when_flagged() {
        let h = harness();
        let script = || {
            RemoteRequest::read(
                OperationKind::RunScript,
                Method::GET,
                "/layouts/L/script/S".into(),
                json!({}),
            )
        };
        let a = h.executor.execute("sales", script()).await.unwrap();
        let b = h.executor.execute("sales", script()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(h.api.data_calls(), 2);
        assert!(h.executor.results.is_empty());

        let mut flagged = create();
        flagged.cacheable = true;
        h.executor.execute("sales", flagged.clone()).await.unwrap();
        h.executor.execute("sales", flagged).await.unwrap();
        assert_eq!(h.api.data_calls(), 4);
        assert!(h.executor.results.is_empty());
    }

    #[tokio::test]
    async fn test_session_reused_across_operations() {
        let h = harness();
        h.executor.execute("sales", metadata()).await.unwrap();
        h.executor
            .execute("sales", find(json!([{"Name": "Acme"}])))
            .await
            .unwrap();
        assert_eq!(h.api.auth_calls(), 1);
        assert_eq!(h.api.data_calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_expiry_self_heals() {
        let h = harness();
        h.api.push_outcome(unauthorized());

        let value = h.executor.execute("sales", metadata()).await.unwrap();
        assert_eq!(value, json!({"response": {"call": 2}}));
        assert_eq!(h.api.auth_calls(), 2);
        assert_eq!(h.api.data_calls(), 2);

        let tokens: Vec<String> = h.api.requests().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["token-1".to_string(), "token-2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rejection_reuses_concurrent_session() {
        let h = harness_with(FakeDataApi::new().with_call_delay(Duration::from_millis(50)));
        h.executor.execute("sales", metadata()).await.unwrap();
        h.api.push_outcome(unauthorized());
        h.api.push_outcome(unauthorized());

        let (a, b) = tokio::join!(
            h.executor.execute("sales", create()),
            h.executor.execute("sales", create()),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(h.api.auth_calls(), 2);
        assert_eq!(h.api.data_calls(), 5);
        let tokens: Vec<String> = h.api.requests().into_iter().map(|(t, _)| t).collect();
        assert_eq!(&tokens[3..], ["token-2".to_string(), "token-2".to_string()]);
    }

    #[tokio::test]
    async fn test_no_infinite_retry() {
        let h = harness();
        h.api.push_outcome(unauthorized());
        h.api.push_outcome(unauthorized());

        let err = h.executor.execute("sales", metadata()).await.unwrap_err();
        assert!(matches!(err, AppError::RequestFailed { status: Some(401), .. }));
        assert_eq!(h.api.data_calls(), MAX_ATTEMPTS);
        assert_eq!(h.api.auth_calls(), 2);
        assert!(h.executor.results.is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let h = harness();
        h.api.push_outcome(RemoteOutcome::Failure(AppError::RequestFailed {
            status: Some(500),
            message: "Layout is missing (code 105)".into(),
        }));
        let err = h.executor.execute("sales", metadata()).await.unwrap_err();
        assert!(matches!(err, AppError::RequestFailed { status: Some(500), .. }));

        h.api.push_outcome(RemoteOutcome::Failure(AppError::Timeout));
        let err = h.executor.execute("sales", metadata()).await.unwrap_err();
        assert_eq!(err, AppError::Timeout);

        assert_eq!(h.api.data_calls(), 2);
        assert_eq!(h.api.auth_calls(), 1);
        assert!(h.executor.results.is_empty());
    }

    #[tokio::test]
    async fn test_authentication_failure_propagates_without_call() {
        let h = harness();
        h.api.fail_next_auth("Invalid user account and/or password");
        let err = h.executor.execute("sales", metadata()).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        assert_eq!(h.api.data_calls(), 0);
    }

    #[tokio::test]
    async fn test_reauthentication_failure_propagates() {
        let h = harness();
        h.executor.execute("sales", create()).await.unwrap();
        h.api.push_outcome(unauthorized());
        h.api.fail_next_auth("account disabled");

        let err = h.executor.execute("sales", create()).await.unwrap_err();
        assert_eq!(err, AppError::Authentication("account disabled".into()));
        assert_eq!(h.api.data_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_key_discrimination() {
        let h = harness();
        let a = h
            .executor
            .execute("sales", find(json!([{"Name": "Acme"}])))
            .await
            .unwrap();
        let b = h
            .executor
            .execute("sales", find(json!([{"Name": "Globex"}])))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(h.api.data_calls(), 2);

        let again = h
            .executor
            .execute("sales", find(json!([{"Name": "Acme"}])))
            .await
            .unwrap();
        assert_eq!(a, again);
        assert_eq!(h.api.data_calls(), 2);
    }

    #[tokio::test]
    async fn test_application_error_payload_is_cached() {
        let h = harness();
        let payload = json!({
            "response": {"scriptError": "3"},
            "messages": [{"code": "0", "message": "OK"}]
        });
        h.api.push_outcome(RemoteOutcome::Success(payload.clone()));

        assert_eq!(h.executor.execute("sales", metadata()).await.unwrap(), payload);
        assert_eq!(h.executor.execute("sales", metadata()).await.unwrap(), payload);
        assert_eq!(h.api.data_calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_results_forces_refetch() {
        let h = harness();
        h.executor.execute("sales", metadata()).await.unwrap();
        assert_eq!(h.executor.clear_results(), 1);
        assert_eq!(h.executor.clear_results(), 0);
        h.executor.execute("sales", metadata()).await.unwrap();
        assert_eq!(h.api.data_calls(), 2);
    }
}
