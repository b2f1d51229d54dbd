//! 工具目录与调度
//!
//! `tools/list` 返回的目录以及 `tools/call` 的按名分发。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use common::errors::{AppError, AppResult};
use common::models::tool::{
    ClearCacheArgs, CreateRecordArgs, LayoutArgs, QueryRecordsArgs, RecordArgs, RunScriptArgs,
    TargetArgs, UpdateRecordArgs,
};

use crate::service::BridgeServiceTrait;

fn target_prop() -> Value {
    json!({ "type": "string", "description": "Target identifier, see list_targets" })
}

fn layout_prop() -> Value {
    json!({ "type": "string", "description": "Layout name" })
}

fn record_id_prop() -> Value {
    json!({ "type": ["string", "integer"], "description": "Internal record id" })
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn tool(name: &str, description: &str, input_schema: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    })
}

/// 工具目录（名称、描述、参数 JSON Schema）
pub fn tool_definitions() -> Vec<Value> {
    vec![
        tool(
            "list_targets",
            "List configured database targets. Never contacts a backend.",
            schema(json!({}), &[]),
        ),
        tool(
            "test_target",
            "Check that a target accepts its credentials and answers.",
            schema(json!({ "target": target_prop() }), &["target"]),
        ),
        tool(
            "get_metadata",
            "List the layouts of a target database.",
            schema(json!({ "target": target_prop() }), &["target"]),
        ),
        tool(
            "get_layout_metadata",
            "Describe the fields and portals of a layout.",
            schema(
                json!({ "target": target_prop(), "layout": layout_prop() }),
                &["target", "layout"],
            ),
        ),
        tool(
            "list_scripts",
            "List the scripts of a target database.",
            schema(json!({ "target": target_prop() }), &["target"]),
        ),
        tool(
            "query_records",
            "Read records from a layout. Without a query every record is listed.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "query": {
                        "type": ["object", "array"],
                        "description": "Find request object, or an array of them"
                    },
                    "sort": {
                        "type": "array",
                        "description": "[{\"fieldName\": ..., \"sortOrder\": \"ascend\"|\"descend\"}]"
                    },
                    "limit": { "type": "integer", "minimum": 1 },
                    "offset": { "type": "integer", "minimum": 1 }
                }),
                &["target", "layout"],
            ),
        ),
        tool(
            "get_record",
            "Fetch one record by id.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "record_id": record_id_prop()
                }),
                &["target", "layout", "record_id"],
            ),
        ),
        tool(
            "create_record",
            "Create a record. Never cached.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "field_data": { "type": "object" }
                }),
                &["target", "layout", "field_data"],
            ),
        ),
        tool(
            "update_record",
            "Update fields of a record. Never cached.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "record_id": record_id_prop(),
                    "field_data": { "type": "object" },
                    "mod_id": { "type": "string" }
                }),
                &["target", "layout", "record_id", "field_data"],
            ),
        ),
        tool(
            "delete_record",
            "Delete a record. Never cached.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "record_id": record_id_prop()
                }),
                &["target", "layout", "record_id"],
            ),
        ),
        tool(
            "run_script",
            "Run a script in the context of a layout. Never cached.",
            schema(
                json!({
                    "target": target_prop(),
                    "layout": layout_prop(),
                    "script": { "type": "string" },
                    "parameter": { "type": "string" }
                }),
                &["target", "layout", "script"],
            ),
        ),
        tool(
            "clear_cache",
            "Drop cached sessions, cached results, or both.",
            schema(
                json!({
                    "scope": { "type": "string", "enum": ["session", "data", "all"] }
                }),
                &[],
            ),
        ),
    ]
}

fn parse<T: DeserializeOwned>(arguments: Value) -> AppResult<T> {
    let arguments = match arguments {
        Value::Null => json!({}),
        other => other,
    };
    Ok(serde_json::from_value(arguments)?)
}

fn to_value<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

/// 按名称调用工具
pub async fn call_tool(
    service: &dyn BridgeServiceTrait,
    name: &str,
    arguments: Value,
) -> AppResult<Value> {
    tracing::debug!(tool = name, "Tool call");
    match name {
        "list_targets" => to_value(json!({ "targets": service.list_targets() })),
        "test_target" => {
            let args: TargetArgs = parse(arguments)?;
            to_value(service.test_target(&args.target).await)
        }
        "get_metadata" => service.get_metadata(parse(arguments)?).await,
        "get_layout_metadata" => {
            let args: LayoutArgs = parse(arguments)?;
            service.get_layout_metadata(args).await
        }
        "list_scripts" => service.list_scripts(parse(arguments)?).await,
        "query_records" => {
            let args: QueryRecordsArgs = parse(arguments)?;
            service.query_records(args).await
        }
        "get_record" => {
            let args: RecordArgs = parse(arguments)?;
            service.get_record(args).await
        }
        "create_record" => {
            let args: CreateRecordArgs = parse(arguments)?;
            service.create_record(args).await
        }
        "update_record" => {
            let args: UpdateRecordArgs = parse(arguments)?;
            service.update_record(args).await
        }
        "delete_record" => {
            let args: RecordArgs = parse(arguments)?;
            service.delete_record(args).await
        }
        "run_script" => {
            let args: RunScriptArgs = parse(arguments)?;
            service.run_script(args).await
        }
        "clear_cache" => {
            let args: ClearCacheArgs = parse(arguments)?;
            to_value(service.clear_cache(args.scope))
        }
        other => Err(AppError::Validation(format!("unknown tool: {other}"))),
    }
}

/// 将工具结果包装为 MCP 内容块，失败时带 `isError`
pub fn tool_result(outcome: AppResult<Value>) -> Value {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false,
            })
        }
        Err(e) => json!({
            "content": [{ "type": "text", "text": format!("{} [{}]", e, e.code()) }],
            "isError": true,
        }),
    }
}
