//! Wire-level request/response payloads for the query service's
//! ExecuteQuery, GetSchema, PreviewTable, and ListTables operations.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::layer::Layer;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteQueryRequest {
    pub sql: String,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteQueryResponse {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, serde_json::Value>>,
    pub total_rows: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetSchemaRequest {
    pub layer: Layer,
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetSchemaResponse {
    pub columns: Vec<ColumnMeta>,
    pub row_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewTableRequest {
    pub layer: Layer,
    pub table_name: String,
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewTableResponse {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTablesQuery {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub layer: Option<Layer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub namespace: String,
    pub layer: Layer,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTablesResponse {
    pub tables: Vec<TableInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_query_request_defaults_limit_to_zero_meaning_engine_default() {
        let req: ExecuteQueryRequest = serde_json::from_str(r#"{"sql":"select 1"}"#).unwrap();
        assert_eq!(req.limit, 0);
    }

    #[test]
    fn list_tables_query_parses_with_no_params() {
        let req: ListTablesQuery = serde_json::from_str("{}").unwrap();
        assert!(req.namespace.is_none());
        assert!(req.layer.is_none());
    }
}
