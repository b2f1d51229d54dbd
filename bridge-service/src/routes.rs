//! 桥接服务路由模块

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{clear_cache, health_check, list_targets, mcp, test_target};
use crate::state::AppState;

/// 创建桥接服务路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mcp", post(mcp))
        .route("/api/targets", get(list_targets))
        .route("/api/targets/{id}/test", get(test_target))
        .route("/api/cache", delete(clear_cache))
        .route("/api/health", get(health_check))
}
