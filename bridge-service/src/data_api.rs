//! Remote Data API client.
//!
//! [`DataApi`] is the downstream contract the session and executor layers
//! depend on: open a session, and issue one token-bearing call whose result
//! is classified into the three outcomes the retry logic cares about.
//! [`HttpDataApi`] implements it over `reqwest`.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use common::errors::{AppError, AppResult};
use common::models::target::{Credentials, TargetProfile};
use common::models::tool::OperationKind;

/// Header some servers use to return the session token.
const TOKEN_HEADER: &str = "x-fm-data-access-token";

/// One remote call, relative to the target's database root.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Logical operation, used for cache keys and logs.
    pub kind: OperationKind,
    /// HTTP method.
    pub method: Method,
    /// Path below `/fmi/data/{version}/databases/{database}`, already encoded.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
    /// Parameters identifying the result for caching.
    pub cache_params: Value,
    /// Whether the result may be served from / stored in the result cache.
    pub cacheable: bool,
}

impl RemoteRequest {
    /// A side-effect-free request whose result may be cached.
    pub fn read(kind: OperationKind, method: Method, path: String, cache_params: Value) -> Self {
        Self {
            kind,
            method,
            path,
            query: Vec::new(),
            body: None,
            cache_params,
            cacheable: true,
        }
    }

    /// A mutating request. Never touches the result cache.
    pub fn write(kind: OperationKind, method: Method, path: String) -> Self {
        Self {
            kind,
            method,
            path,
            query: Vec::new(),
            body: None,
            cache_params: Value::Null,
            cacheable: false,
        }
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Classified result of a single remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Transport-level success; the payload is returned untouched.
    Success(Value),
    /// The backend rejected the session token.
    AuthRejected(String),
    /// Any other failure, never retried.
    Failure(AppError),
}

/// Downstream contract of the remote backend.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Opens a session with the target's credentials and returns its token.
    async fn authenticate(&self, target: &TargetProfile) -> AppResult<String>;

    /// Issues one call carrying `token`.
    async fn call(&self, target: &TargetProfile, token: &str, request: &RemoteRequest)
        -> RemoteOutcome;
}

/// Percent-encodes one path segment.
pub fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// `reqwest` implementation of [`DataApi`].
#[derive(Clone)]
pub struct HttpDataApi {
    client: reqwest::Client,
}

impl HttpDataApi {
    /// Builds the shared HTTP client.
    pub fn new(timeout: Duration, verify_ssl: bool) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        if !verify_ssl {
            tracing::warn!("TLS certificate verification is disabled");
        }
        Ok(Self { client })
    }

    fn database_url(target: &TargetProfile) -> String {
        format!(
            "{}/fmi/data/{}/databases/{}",
            target.endpoint(),
            segment(&target.api_version),
            segment(&target.database)
        )
    }
}

#[async_trait]
impl DataApi for HttpDataApi {
    async fn authenticate(&self, target: &TargetProfile) -> AppResult<String> {
        let url = format!("{}/sessions", Self::database_url(target));
        let request = self.client.post(&url).json(&json!({}));
        let request = match &target.credentials {
            Credentials::UsernamePassword { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::ApiKey(key) => request.bearer_auth(key),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = read_json(response).await?;

        if !status.is_success() {
            let message = backend_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AppError::Authentication(message));
        }

        extract_token(&headers, &body).ok_or_else(|| {
            AppError::Authentication("session response did not contain a token".to_string())
        })
    }

    async fn call(
        &self,
        target: &TargetProfile,
        token: &str,
        request: &RemoteRequest,
    ) -> RemoteOutcome {
        let url = format!("{}{}", Self::database_url(target), request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return RemoteOutcome::Failure(transport_error(e)),
        };
        let status = response.status();
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(e) => return RemoteOutcome::Failure(e),
        };

        classify(status, body)
    }
}

fn classify(status: StatusCode, body: Value) -> RemoteOutcome {
    if status.is_success() {
        return RemoteOutcome::Success(body);
    }
    let message = backend_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    });
    if status == StatusCode::UNAUTHORIZED {
        RemoteOutcome::AuthRejected(message)
    } else {
        RemoteOutcome::Failure(AppError::RequestFailed {
            status: Some(status.as_u16()),
            message,
        })
    }
}

async fn read_json(response: reqwest::Response) -> AppResult<Value> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    // Non-JSON bodies (proxies, HTML error pages) are kept as text.
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}

fn transport_error(error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout
    } else {
        AppError::Network(error.without_url().to_string())
    }
}

/// First backend message of a Data API payload, with its code.
fn backend_message(body: &Value) -> Option<String> {
    let first = body.get("messages")?.as_array()?.first()?;
    let message = first.get("message")?.as_str()?;
    match first.get("code").and_then(|c| c.as_str()) {
        Some(code) => Some(format!("{message} (code {code})")),
        None => Some(message.to_string()),
    }
}

fn extract_token(headers: &HeaderMap, body: &Value) -> Option<String> {
    body.pointer("/response/token")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|t| !t.is_empty())
}
