//! Handler模块

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

use common::errors::AppError;
use common::models::target::TargetSummary;
use common::models::tool::CacheScope;
use common::response::ApiResponse;

use crate::jsonrpc::{
    JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use crate::service::{ClearCacheResult, TargetTestResult};
use crate::session::SessionInfo;
use crate::state::AppState;
use crate::tools::{call_tool, tool_definitions, tool_result};

const SERVICE_NAME: &str = "bridge-service";
const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP 入口（JSON-RPC 2.0）
#[utoipa::path(
    post,
    path = "/mcp",
    tag = "mcp",
    request_body = JsonRpcRequest,
    responses(
        (status = 200, description = "JSON-RPC 响应", body = JsonRpcResponse),
        (status = 202, description = "通知已接收")
    )
)]
pub async fn mcp(State(state): State<AppState>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            let message = format!("parse error: {e}");
            return JsonRpcResponse::failure(None, PARSE_ERROR, message).into_response();
        }
    };
    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            let message = format!("invalid request: {e}");
            return JsonRpcResponse::failure(None, INVALID_REQUEST, message).into_response();
        }
    };

    if request.jsonrpc != "2.0" {
        return JsonRpcResponse::failure(request.id, INVALID_REQUEST, "jsonrpc must be \"2.0\"")
            .into_response();
    }

    // 通知没有 id，也不需要响应体
    if request.id.is_none() && request.method.starts_with("notifications/") {
        tracing::debug!(method = %request.method, "Notification received");
        return StatusCode::ACCEPTED.into_response();
    }

    dispatch(&state, request).await.into_response()
}

async fn dispatch(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id;
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, "missing tool name");
            };
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

            let outcome = call_tool(state.service.as_ref(), name, arguments).await;
            if let Err(e) = &outcome {
                tracing::warn!(tool = name, code = e.code(), error = %e, "Tool call failed");
            }
            JsonRpcResponse::success(id, tool_result(outcome))
        }
        other => {
            JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("method not found: {other}"))
        }
    }
}

/// 列出所有已配置的目标
#[utoipa::path(
    get,
    path = "/api/targets",
    tag = "targets",
    responses(
        (status = 200, description = "目标列表", body = ApiResponse<Vec<TargetSummary>>)
    )
)]
pub async fn list_targets(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TargetSummary>>>, AppError> {
    let data = state.service.list_targets();
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 测试目标连通性
#[utoipa::path(
    get,
    path = "/api/targets/{id}/test",
    tag = "targets",
    params(
        ("id" = String, Path, description = "目标 ID")
    ),
    responses(
        (status = 200, description = "连通性测试结果", body = ApiResponse<TargetTestResult>)
    )
)]
pub async fn test_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TargetTestResult>>, AppError> {
    let data = state.service.test_target(&id).await;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 缓存清理参数
#[derive(Debug, Deserialize, IntoParams)]
pub struct ClearCacheQuery {
    /// session、data 或 all（默认）
    #[serde(default)]
    pub scope: CacheScope,
}

/// 清理缓存
#[utoipa::path(
    delete,
    path = "/api/cache",
    tag = "cache",
    params(ClearCacheQuery),
    responses(
        (status = 200, description = "清理结果", body = ApiResponse<ClearCacheResult>)
    )
)]
pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<ClearCacheQuery>,
) -> Result<Json<ApiResponse<ClearCacheResult>>, AppError> {
    let data = state.service.clear_cache(query.scope);
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        targets: state.registry.len(),
        sessions: state.sessions.sessions(),
        cached_results: state.results.len(),
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 已配置目标数
    pub targets: usize,
    /// 有效会话（不含令牌）
    pub sessions: Vec<SessionInfo>,
    /// 缓存中的结果数
    pub cached_results: usize,
}
