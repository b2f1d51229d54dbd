//! Tool argument models.
//!
//! Each callable tool deserializes its `arguments` object into one of these
//! structs and validates it before any remote call is made.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

/// Logical kind of a remote operation. Part of every result cache key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Database-level metadata (layout list).
    Metadata,
    /// Field and portal metadata of one layout.
    LayoutMetadata,
    /// Script catalog.
    ListScripts,
    /// Unfiltered record listing.
    ListRecords,
    /// Filtered find request.
    FindRecords,
    /// Single record by id.
    GetRecord,
    /// Record creation.
    CreateRecord,
    /// Record update.
    UpdateRecord,
    /// Record deletion.
    DeleteRecord,
    /// Script execution.
    RunScript,
}

impl OperationKind {
    /// Stable identifier used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Metadata => "metadata",
            OperationKind::LayoutMetadata => "layout_metadata",
            OperationKind::ListScripts => "list_scripts",
            OperationKind::ListRecords => "list_records",
            OperationKind::FindRecords => "find_records",
            OperationKind::GetRecord => "get_record",
            OperationKind::CreateRecord => "create_record",
            OperationKind::UpdateRecord => "update_record",
            OperationKind::DeleteRecord => "delete_record",
            OperationKind::RunScript => "run_script",
        }
    }

    /// Whether the operation changes state on the backend.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            OperationKind::CreateRecord
                | OperationKind::UpdateRecord
                | OperationKind::DeleteRecord
                | OperationKind::RunScript
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cache(s) `clear_cache` empties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Session tokens only.
    Session,
    /// Cached results only.
    Data,
    /// Both caches.
    #[default]
    All,
}

/// Arguments naming only a target.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TargetArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
}

/// Arguments naming a target and a layout.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LayoutArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout name.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
}

/// Arguments of `query_records`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueryRecordsArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout name.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
    /// Find criteria: one request object or an array of them.
    #[serde(default)]
    pub query: Option<Value>,
    /// Sort rules: `[{"fieldName": .., "sortOrder": "ascend"|"descend"}]`.
    #[serde(default)]
    pub sort: Option<Value>,
    /// Maximum number of records.
    #[validate(range(min = 1, max = 100000, message = "limit must be positive"))]
    #[serde(default)]
    pub limit: Option<u32>,
    /// 1-based offset of the first record.
    #[validate(range(min = 1, message = "offset is 1-based"))]
    #[serde(default)]
    pub offset: Option<u32>,
}

impl QueryRecordsArgs {
    /// Find requests normalized to an array, or `None` for a plain listing.
    pub fn find_requests(&self) -> Option<Vec<Value>> {
        match &self.query {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) if items.is_empty() => None,
            Some(Value::Array(items)) => Some(items.clone()),
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(other) => Some(vec![other.clone()]),
        }
    }
}

/// Arguments addressing a single record.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout name.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
    /// Internal record id.
    #[serde(deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "record_id is required"))]
    pub record_id: String,
}

/// Arguments of `create_record`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRecordArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout name.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
    /// Field name to value.
    pub field_data: Map<String, Value>,
}

/// Arguments of `update_record`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateRecordArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout name.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
    /// Internal record id.
    #[serde(deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "record_id is required"))]
    pub record_id: String,
    /// Field name to new value.
    pub field_data: Map<String, Value>,
    /// Optimistic-locking modification id.
    #[serde(default)]
    pub mod_id: Option<String>,
}

/// Arguments of `run_script`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RunScriptArgs {
    /// Target identifier.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
    /// Layout providing the script context.
    #[validate(length(min = 1, message = "layout is required"))]
    pub layout: String,
    /// Script name.
    #[validate(length(min = 1, message = "script is required"))]
    pub script: String,
    /// Optional script parameter.
    #[serde(default)]
    pub parameter: Option<String>,
}

/// Arguments of `clear_cache`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ClearCacheArgs {
    /// Cache(s) to clear.
    #[serde(default)]
    pub scope: CacheScope,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
