//! 工具操作服务模块
//!
//! 每个工具对应一个方法：校验参数、构造远端请求，交给执行器处理。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppResult;
use common::models::target::TargetSummary;
use common::models::tool::{
    CacheScope, CreateRecordArgs, LayoutArgs, OperationKind, QueryRecordsArgs, RecordArgs,
    RunScriptArgs, TargetArgs, UpdateRecordArgs,
};

use crate::data_api::{segment, RemoteRequest};
use crate::executor::RequestExecutor;
use crate::registry::TargetRegistry;
use crate::session::SessionManager;

/// 目标连通性测试结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TargetTestResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 缓存清理结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClearCacheResult {
    pub scope: CacheScope,
    pub sessions_removed: usize,
    pub results_removed: usize,
}

/// 工具服务 Trait
#[async_trait]
pub trait BridgeServiceTrait: Send + Sync {
    /// 列出所有目标
    fn list_targets(&self) -> Vec<TargetSummary>;

    /// 测试目标连通性
    async fn test_target(&self, id: &str) -> TargetTestResult;

    /// 数据库元数据（布局列表）
    async fn get_metadata(&self, args: TargetArgs) -> AppResult<Value>;

    /// 布局元数据
    async fn get_layout_metadata(&self, args: LayoutArgs) -> AppResult<Value>;

    /// 脚本列表
    async fn list_scripts(&self, args: TargetArgs) -> AppResult<Value>;

    /// 查询记录
    async fn query_records(&self, args: QueryRecordsArgs) -> AppResult<Value>;

    /// 获取单条记录
    async fn get_record(&self, args: RecordArgs) -> AppResult<Value>;

    /// 创建记录
    async fn create_record(&self, args: CreateRecordArgs) -> AppResult<Value>;

    /// 更新记录
    async fn update_record(&self, args: UpdateRecordArgs) -> AppResult<Value>;

    /// 删除记录
    async fn delete_record(&self, args: RecordArgs) -> AppResult<Value>;

    /// 执行脚本
    async fn run_script(&self, args: RunScriptArgs) -> AppResult<Value>;

    /// 清理缓存
    fn clear_cache(&self, scope: CacheScope) -> ClearCacheResult;
}

/// Data API 工具服务
pub struct BridgeService {
    registry: Arc<TargetRegistry>,
    sessions: Arc<SessionManager>,
    executor: Arc<RequestExecutor>,
}

impl BridgeService {
    /// 创建新的工具服务实例
    pub fn new(
        registry: Arc<TargetRegistry>,
        sessions: Arc<SessionManager>,
        executor: Arc<RequestExecutor>,
    ) -> Self {
        Self {
            registry,
            sessions,
            executor,
        }
    }
}

fn layout_path(layout: &str, rest: &str) -> String {
    format!("/layouts/{}{}", segment(layout), rest)
}

fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

#[async_trait]
impl BridgeServiceTrait for BridgeService {
    fn list_targets(&self) -> Vec<TargetSummary> {
        self.registry.summaries()
    }

    async fn test_target(&self, id: &str) -> TargetTestResult {
        let start = Instant::now();
        let request = RemoteRequest {
            cacheable: false,
            ..RemoteRequest::read(
                OperationKind::Metadata,
                Method::GET,
                "/layouts".into(),
                Value::Null,
            )
        };

        match self.executor.execute(id, request).await {
            Ok(_) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                tracing::info!(target_id = %id, latency_ms, "Target reachable");
                TargetTestResult {
                    id: id.to_string(),
                    success: true,
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Err(e) => TargetTestResult {
                id: id.to_string(),
                success: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn get_metadata(&self, args: TargetArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::read(
            OperationKind::Metadata,
            Method::GET,
            "/layouts".into(),
            json!({}),
        );
        self.executor.execute(&args.target, request).await
    }

    async fn get_layout_metadata(&self, args: LayoutArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::read(
            OperationKind::LayoutMetadata,
            Method::GET,
            layout_path(&args.layout, ""),
            json!({ "layout": args.layout }),
        );
        self.executor.execute(&args.target, request).await
    }

    async fn list_scripts(&self, args: TargetArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::read(
            OperationKind::ListScripts,
            Method::GET,
            "/scripts".into(),
            json!({}),
        );
        self.executor.execute(&args.target, request).await
    }

    async fn query_records(&self, args: QueryRecordsArgs) -> AppResult<Value> {
        args.validate()?;

        let request = match args.find_requests() {
            Some(query) => {
                // Find requests take every option in the body.
                let mut body = Map::new();
                body.insert("query".into(), Value::Array(query.clone()));
                insert_some(&mut body, "sort", args.sort.clone());
                insert_some(&mut body, "limit", args.limit.map(|l| json!(l.to_string())));
                insert_some(&mut body, "offset", args.offset.map(|o| json!(o.to_string())));

                RemoteRequest::read(
                    OperationKind::FindRecords,
                    Method::POST,
                    layout_path(&args.layout, "/_find"),
                    json!({
                        "layout": args.layout.clone(),
                        "query": query,
                        "sort": args.sort.clone(),
                        "limit": args.limit,
                        "offset": args.offset,
                    }),
                )
                .with_body(Value::Object(body))
            }
            None => {
                let mut request = RemoteRequest::read(
                    OperationKind::ListRecords,
                    Method::GET,
                    layout_path(&args.layout, "/records"),
                    json!({
                        "layout": args.layout.clone(),
                        "sort": args.sort.clone(),
                        "limit": args.limit,
                        "offset": args.offset,
                    }),
                );
                if let Some(limit) = args.limit {
                    request = request.with_query("_limit", limit);
                }
                if let Some(offset) = args.offset {
                    request = request.with_query("_offset", offset);
                }
                if let Some(sort) = &args.sort {
                    request = request.with_query("_sort", sort);
                }
                request
            }
        };

        self.executor.execute(&args.target, request).await
    }

    async fn get_record(&self, args: RecordArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::read(
            OperationKind::GetRecord,
            Method::GET,
            layout_path(&args.layout, &format!("/records/{}", segment(&args.record_id))),
            json!({ "layout": args.layout, "record_id": args.record_id }),
        );
        self.executor.execute(&args.target, request).await
    }

    async fn create_record(&self, args: CreateRecordArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::write(
            OperationKind::CreateRecord,
            Method::POST,
            layout_path(&args.layout, "/records"),
        )
        .with_body(json!({ "fieldData": args.field_data }));
        self.executor.execute(&args.target, request).await
    }

    async fn update_record(&self, args: UpdateRecordArgs) -> AppResult<Value> {
        args.validate()?;
        let mut body = Map::new();
        body.insert("fieldData".into(), Value::Object(args.field_data));
        insert_some(&mut body, "modId", args.mod_id.map(Value::String));

        let request = RemoteRequest::write(
            OperationKind::UpdateRecord,
            Method::PATCH,
            layout_path(&args.layout, &format!("/records/{}", segment(&args.record_id))),
        )
        .with_body(Value::Object(body));
        self.executor.execute(&args.target, request).await
    }

    async fn delete_record(&self, args: RecordArgs) -> AppResult<Value> {
        args.validate()?;
        let request = RemoteRequest::write(
            OperationKind::DeleteRecord,
            Method::DELETE,
            layout_path(&args.layout, &format!("/records/{}", segment(&args.record_id))),
        );
        self.executor.execute(&args.target, request).await
    }

    async fn run_script(&self, args: RunScriptArgs) -> AppResult<Value> {
        args.validate()?;
        let mut request = RemoteRequest::write(
            OperationKind::RunScript,
            Method::GET,
            layout_path(&args.layout, &format!("/script/{}", segment(&args.script))),
        );
        if let Some(parameter) = &args.parameter {
            request = request.with_query("script.param", parameter);
        }
        self.executor.execute(&args.target, request).await
    }

    fn clear_cache(&self, scope: CacheScope) -> ClearCacheResult {
        let sessions_removed = match scope {
            CacheScope::Session | CacheScope::All => self.sessions.clear(),
            CacheScope::Data => 0,
        };
        let results_removed = match scope {
            CacheScope::Data | CacheScope::All => self.executor.clear_results(),
            CacheScope::Session => 0,
        };
        tracing::info!(?scope, sessions_removed, results_removed, "Cache cleared");
        ClearCacheResult {
            scope,
            sessions_removed,
            results_removed,
        }
    }
}
