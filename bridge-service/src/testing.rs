//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use common::errors::{AppError, AppResult};
use common::models::target::{Credentials, Protocol, TargetProfile};

use crate::data_api::{DataApi, RemoteOutcome, RemoteRequest};

/// Profile pointing nowhere, for tests that never leave the process.
pub fn profile(id: &str) -> TargetProfile {
    TargetProfile {
        id: id.to_string(),
        host: format!("{id}.invalid"),
        database: id.to_uppercase(),
        protocol: Protocol::Https,
        api_version: "vLatest".to_string(),
        credentials: Credentials::UsernamePassword {
            username: "api".to_string(),
            password: "secret".to_string(),
        },
    }
}

/// In-memory [`DataApi`] that counts calls and replays scripted outcomes.
///
/// Tokens are `token-1`, `token-2`, ... in issue order. Unscripted calls
/// succeed with `{"response": {"call": n}}` where `n` counts data calls.
#[derive(Default)]
pub struct FakeDataApi {
    auth_calls: AtomicUsize,
    data_calls: AtomicUsize,
    auth_failures: Mutex<VecDeque<String>>,
    outcomes: Mutex<VecDeque<RemoteOutcome>>,
    requests: Mutex<Vec<(String, RemoteRequest)>>,
    auth_delay: Option<Duration>,
    call_delay: Option<Duration>,
}

impl FakeDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn fail_next_auth(&self, message: &str) {
        self.auth_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn push_outcome(&self, outcome: RemoteOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    /// `(token, request)` of every data call, in order.
    pub fn requests(&self) -> Vec<(String, RemoteRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataApi for FakeDataApi {
    async fn authenticate(&self, _target: &TargetProfile) -> AppResult<String> {
        if let Some(delay) = self.auth_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = self.auth_failures.lock().unwrap().pop_front() {
            return Err(AppError::Authentication(message));
        }
        Ok(format!("token-{n}"))
    }

    async fn call(
        &self,
        _target: &TargetProfile,
        token: &str,
        request: &RemoteRequest,
    ) -> RemoteOutcome {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.data_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap()
            .push((token.to_string(), request.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RemoteOutcome::Success(json!({"response": {"call": n}})))
    }
}
