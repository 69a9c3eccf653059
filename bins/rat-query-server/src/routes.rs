//! HTTP routes for the query service: ExecuteQuery, GetSchema, PreviewTable,
//! and ListTables — the four read-only RPCs named in `SPEC_FULL.md`'s
//! supplemented "Query service" feature.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use rat_rpc::{
    ExecuteQueryRequest, ExecuteQueryResponse, GetSchemaRequest, GetSchemaResponse,
    ListTablesQuery, ListTablesResponse, PreviewTableRequest, PreviewTableResponse, RpcError,
    TableInfo,
};

use crate::json_rows::{batches_to_json_rows, columns_from_schema};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/query", post(execute_query))
        .route("/v1/tables", get(list_tables))
        .route("/v1/tables/schema", post(get_schema))
        .route("/v1/tables/preview", post(preview_table))
        .with_state(state)
}

struct ApiError(RpcError);

impl From<RpcError> for ApiError {
    fn from(e: RpcError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.sanitized_message() }));
        (status, body).into_response()
    }
}

async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<ExecuteQueryResponse>, ApiError> {
    let t0 = Instant::now();
    let limit = if req.limit == 0 { state.config.default_query_limit } else { req.limit };
    let timeout = if req.timeout_seconds == 0 { state.config.default_query_timeout_seconds } else { req.timeout_seconds };

    let batches = state
        .engine
        .query_arrow(&req.sql, limit, timeout)
        .await
        .map_err(|e| RpcError::InvalidArgument(e.to_string()))?;

    let columns = batches.first().map(|b| columns_from_schema(&b.schema())).unwrap_or_default();
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    let rows = batches_to_json_rows(&batches, limit);

    Ok(Json(ExecuteQueryResponse {
        columns,
        rows,
        total_rows,
        duration_ms: t0.elapsed().as_millis() as u64,
    }))
}

async fn get_schema(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetSchemaRequest>,
) -> Result<Json<GetSchemaResponse>, ApiError> {
    let pairs = state
        .engine
        .describe_table(req.layer.as_str(), &req.table_name)
        .await
        .map_err(|e| RpcError::NotFound(e.to_string()))?;
    let row_count = state
        .engine
        .count_rows(req.layer.as_str(), &req.table_name)
        .await
        .unwrap_or(0);

    Ok(Json(GetSchemaResponse {
        columns: pairs
            .into_iter()
            .map(|(name, data_type)| rat_rpc::ColumnMeta { name, data_type })
            .collect(),
        row_count,
    }))
}

async fn preview_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewTableRequest>,
) -> Result<Json<PreviewTableResponse>, ApiError> {
    let limit = if req.limit == 0 { state.config.default_query_limit } else { req.limit };
    let sql = format!("SELECT * FROM \"{}\".\"{}\"", req.layer.as_str(), req.table_name);
    let batches = state
        .engine
        .query_arrow(&sql, limit, state.config.default_query_timeout_seconds)
        .await
        .map_err(|e| RpcError::NotFound(e.to_string()))?;

    let columns = batches.first().map(|b| columns_from_schema(&b.schema())).unwrap_or_default();
    let rows = batches_to_json_rows(&batches, limit);

    Ok(Json(PreviewTableResponse { columns, rows }))
}

/// Row counts are intentionally omitted here — see `SPEC_FULL.md`: adding
/// them would mean one `COUNT(*)` per table on every `ListTables` call.
async fn list_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTablesQuery>,
) -> Json<ListTablesResponse> {
    let namespaces: Vec<String> = match &query.namespace {
        Some(ns) => vec![ns.clone()],
        None => state.config.namespaces.clone(),
    };

    let mut tables = Vec::new();
    for ns in namespaces {
        for entry in state.catalog.get_tables(&ns, query.layer.map(|l| l.as_str())) {
            let Some(layer) = rat_rpc::Layer::parse(&entry.layer) else { continue };
            tables.push(TableInfo { namespace: entry.namespace, layer, name: entry.name });
        }
    }
    Json(ListTablesResponse { tables })
}
