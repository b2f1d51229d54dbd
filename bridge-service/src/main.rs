//! Data API 桥接服务
//!
//! 将远端数据库的记录、元数据和脚本以 MCP 工具的形式暴露出来，包括：
//! - 多目标发现与凭据管理
//! - 会话令牌复用与过期自动重新认证
//! - 只读结果缓存

mod cache;
mod data_api;
mod executor;
mod handlers;
mod jsonrpc;
mod registry;
mod routes;
mod service;
mod session;
mod state;
mod tools;

#[cfg(test)]
mod testing;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{env_snapshot, AppConfig, LogFormat};
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "bridge-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "桥接服务 API",
        version = "0.1.0",
        description = "Data API 桥接微服务"
    ),
    paths(
        handlers::mcp,
        handlers::list_targets,
        handlers::test_target,
        handlers::clear_cache,
        handlers::health_check,
    ),
    components(schemas(
        common::models::TargetSummary,
        common::models::CacheScope,
        jsonrpc::JsonRpcRequest,
        jsonrpc::JsonRpcResponse,
        jsonrpc::JsonRpcError,
        service::TargetTestResult,
        service::ClearCacheResult,
        session::SessionInfo,
        handlers::HealthResponse,
    )),
    tags(
        (name = "mcp", description = "MCP 工具调用端点"),
        (name = "targets", description = "目标管理端点"),
        (name = "cache", description = "缓存管理端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 加载配置
    let vars = env_snapshot();
    let config = AppConfig::from_vars(SERVICE_NAME, &vars);

    // 初始化日志追踪
    init_tracing(config.log_format);

    if let Some(requested) = config.session_ttl_clamped_from {
        warn!(
            requested_secs = requested,
            session_ttl_secs = config.session_ttl_secs,
            backend_session_timeout_secs = config.backend_session_timeout_secs,
            "会话缓存 TTL 不小于后端会话超时，已下调"
        );
    }

    // 创建应用状态（发现目标，构造 HTTP 客户端）
    let state = AppState::from_config(config.clone(), &vars)
        .context("Failed to initialize application state (check TARGET_* variables)")?;
    info!(
        targets = ?state.registry.ids(),
        session_ttl_secs = state.credentials.ttl().as_secs(),
        data_ttl_secs = state.results.ttl().as_secs(),
        "已加载目标"
    );

    let sweepers = state.spawn_sweepers();

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务启动失败")?;

    for sweeper in sweepers {
        sweeper.abort();
    }
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

pub(crate) fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号");
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if !env_path.exists() {
        return;
    }
    let Ok(content) = std::fs::read_to_string(env_path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            // Only set if not already set by the environment
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}
