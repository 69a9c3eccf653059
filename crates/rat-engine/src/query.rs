//! Long-lived, access-controlled engine backing the query service. Unlike
//! `PipelineEngine`, a single `QueryEngine` instance is shared across every
//! incoming query — its only mutable state is the set of registered views,
//! guarded by a dedicated lock so DDL never blocks concurrent reads for long.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::catalog::{MemoryCatalogProvider, MemorySchemaProvider};
use datafusion::datasource::file_format::parquet::ParquetFormat;
use datafusion::datasource::listing::{
    ListingOptions, ListingTable, ListingTableConfig, ListingTableUrl,
};
use datafusion::execution::context::SessionContext;
use rat_core::{EngineConfig, S3Config};
use regex::Regex;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::EngineError;
use crate::s3::register_object_store;

const VALID_SCHEMAS: [&str; 3] = ["bronze", "silver", "gold"];
const MAX_QUERY_LENGTH: usize = 100_000;
const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_QUERY_LIMIT: usize = 1_000;

fn safe_identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap())
}

fn blocked_statements_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE|COPY|ATTACH|DETACH|INSTALL|LOAD|IMPORT|EXPORT|CALL|EXECUTE|PREPARE|DEALLOCATE|SET|RESET|PRAGMA|CHECKPOINT|VACUUM|GRANT|REVOKE)\b",
        )
        .unwrap()
    })
}

fn blocked_functions_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(read_parquet|read_csv_auto|read_csv|read_json_auto|read_json|read_text|read_blob|parquet_scan|parquet_metadata|parquet_schema|csv_scan|json_scan|httpfs_|http_get|http_post|postgres_scan|sqlite_scan|mysql_scan|glob|read_ndjson_auto|read_ndjson)\s*\(",
        )
        .unwrap()
    })
}

fn ns_table_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\w+)\.(bronze|silver|gold)\.(\w+)\b").unwrap())
}

fn strip_sql_comments(sql: &str) -> String {
    static LINE: OnceLock<Regex> = OnceLock::new();
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    let line = LINE.get_or_init(|| Regex::new(r"--[^\n]*").unwrap());
    let block = BLOCK.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
    block.replace_all(&line.replace_all(sql, ""), "").trim().to_string()
}

fn validate_identifier(value: &str, label: &'static str) -> Result<(), EngineError> {
    if !safe_identifier_re().is_match(value) {
        return Err(EngineError::InvalidIdentifier(label, value.to_string()));
    }
    Ok(())
}

fn validate_schema(schema: &str) -> Result<(), EngineError> {
    if !VALID_SCHEMAS.contains(&schema) {
        return Err(EngineError::InvalidSchema(schema.to_string()));
    }
    Ok(())
}

/// Auto-quotes `namespace.layer.table` references so a reserved word used as
/// a namespace (e.g. `default`) doesn't trip the SQL parser.
fn quote_ns_table_refs(sql: &str) -> String {
    ns_table_ref_re()
        .replace_all(sql, r#""$1"."$2"."$3""#)
        .to_string()
}

pub struct QueryEngine {
    ctx: SessionContext,
    bucket: String,
    ddl_lock: AsyncMutex<()>,
    registered_namespaces: AsyncMutex<HashSet<String>>,
}

impl QueryEngine {
    pub fn new(s3_config: &S3Config, engine_config: &EngineConfig) -> Result<Self, EngineError> {
        let session_config = datafusion::execution::context::SessionConfig::new()
            .with_target_partitions(engine_config.threads);
        let ctx = SessionContext::new_with_config(session_config);
        register_object_store(&ctx, s3_config)?;
        Ok(Self {
            ctx,
            bucket: s3_config.bucket.clone(),
            ddl_lock: AsyncMutex::new(()),
            registered_namespaces: AsyncMutex::new(HashSet::new()),
        })
    }

    async fn listing_table_for(&self, s3_path: &str) -> Result<Arc<ListingTable>, EngineError> {
        let glob = format!("{}/", s3_path.trim_end_matches('/'));
        let table_url = ListingTableUrl::parse(&glob).map_err(EngineError::Execution)?;
        let file_format = ParquetFormat::new();
        let options = ListingOptions::new(Arc::new(file_format)).with_file_extension(".parquet");
        let resolved_schema: SchemaRef = options
            .infer_schema(&self.ctx.state(), &table_url)
            .await
            .map_err(EngineError::Execution)?;
        let config = ListingTableConfig::new(table_url)
            .with_listing_options(options)
            .with_schema(resolved_schema);
        let table = ListingTable::try_new(config).map_err(EngineError::Execution)?;
        Ok(Arc::new(table))
    }

    /// Register a view over `s3_path`'s parquet files under both
    /// `layer.table` and, if `namespace` is given, `namespace.layer.table`.
    pub async fn register_view(
        &self,
        layer: &str,
        name: &str,
        s3_path: &str,
        namespace: Option<&str>,
    ) -> Result<(), EngineError> {
        validate_schema(layer)?;
        validate_identifier(name, "table name")?;
        let table = self.listing_table_for(s3_path).await?;

        let _guard = self.ddl_lock.lock().await;
        self.ctx
            .register_table(format!("{layer}.{name}").as_str(), table.clone())?;

        if let Some(ns) = namespace {
            validate_identifier(ns, "namespace")?;
            self.ensure_catalog(ns).await;
            let qualified = datafusion::sql::TableReference::full(ns, layer, name);
            self.ctx.register_table(qualified, table)?;
        }
        Ok(())
    }

    async fn ensure_catalog(&self, namespace: &str) {
        let mut seen = self.registered_namespaces.lock().await;
        if seen.contains(namespace) {
            return;
        }
        let catalog = Arc::new(MemoryCatalogProvider::new());
        for layer in VALID_SCHEMAS {
            catalog.register_schema(layer, Arc::new(MemorySchemaProvider::new())).ok();
        }
        self.ctx.register_catalog(namespace, catalog);
        seen.insert(namespace.to_string());
    }

    pub async fn drop_view(&self, layer: &str, name: &str, namespace: Option<&str>) -> Result<(), EngineError> {
        validate_schema(layer)?;
        validate_identifier(name, "table name")?;
        let _guard = self.ddl_lock.lock().await;
        self.ctx.deregister_table(format!("{layer}.{name}").as_str())?;
        if let Some(ns) = namespace {
            validate_identifier(ns, "namespace")?;
            let qualified = datafusion::sql::TableReference::full(ns, layer, name);
            self.ctx.deregister_table(qualified)?;
        }
        Ok(())
    }

    pub async fn drop_all_views(&self) -> Result<(), EngineError> {
        let _guard = self.ddl_lock.lock().await;
        for layer in VALID_SCHEMAS {
            self.ctx.sql(&format!("DROP SCHEMA IF EXISTS {layer} CASCADE")).await.ok();
        }
        Ok(())
    }

    /// Execute a read-only query, wrapped in a row limit and a timeout.
    /// Security checks run in order: length, blocked statements, blocked
    /// functions, then the query is namespace-ref-quoted and limit-wrapped.
    pub async fn query_arrow(
        &self,
        sql: &str,
        limit: usize,
        timeout_seconds: u64,
    ) -> Result<Vec<RecordBatch>, EngineError> {
        if sql.len() > MAX_QUERY_LENGTH {
            return Err(EngineError::QueryTooLong(sql.len(), MAX_QUERY_LENGTH));
        }
        let stripped = strip_sql_comments(sql);
        if blocked_statements_re().is_match(&stripped) {
            return Err(EngineError::BlockedStatement);
        }
        if blocked_functions_re().is_match(&stripped) {
            return Err(EngineError::BlockedFunction);
        }

        let trimmed = sql.trim().trim_end_matches(';');
        let quoted = quote_ns_table_refs(trimmed);
        let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };
        let wrapped = format!("SELECT * FROM ({quoted}) AS _q LIMIT {limit}");

        let timeout = Duration::from_secs(if timeout_seconds == 0 {
            DEFAULT_QUERY_TIMEOUT_SECONDS
        } else {
            timeout_seconds
        });
        let fut = async {
            let df = self.ctx.sql(&wrapped).await?;
            df.collect().await
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Timeout(timeout.as_secs())),
        }
    }

    pub async fn describe_table(&self, schema: &str, name: &str) -> Result<Vec<(String, String)>, EngineError> {
        validate_schema(schema)?;
        validate_identifier(name, "table name")?;
        let df = self.ctx.sql(&format!("DESCRIBE \"{schema}\".\"{name}\"")).await?;
        let batches = df.collect().await?;
        Ok(rows_as_string_pairs(&batches))
    }

    pub async fn count_rows(&self, schema: &str, name: &str) -> Result<i64, EngineError> {
        validate_schema(schema)?;
        validate_identifier(name, "table name")?;
        let df = self
            .ctx
            .sql(&format!("SELECT COUNT(*) AS n FROM \"{schema}\".\"{name}\""))
            .await?;
        let batches = df.collect().await?;
        let count = batches
            .first()
            .and_then(|b| b.column(0).as_any().downcast_ref::<datafusion::arrow::array::Int64Array>().map(|a| a.value(0)))
            .unwrap_or(0);
        Ok(count)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn rows_as_string_pairs(batches: &[RecordBatch]) -> Vec<(String, String)> {
    use datafusion::arrow::array::StringArray;
    let mut out = Vec::new();
    for batch in batches {
        if batch.num_columns() < 2 {
            continue;
        }
        let names = batch.column(0).as_any().downcast_ref::<StringArray>();
        let types = batch.column(1).as_any().downcast_ref::<StringArray>();
        if let (Some(names), Some(types)) = (names, types) {
            for i in 0..batch.num_rows() {
                out.push((names.value(i).to_string(), types.value(i).to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_non_select_statements() {
        assert!(blocked_statements_re().is_match("DROP TABLE bronze.orders"));
        assert!(blocked_statements_re().is_match("  insert into silver.orders values (1)"));
        assert!(!blocked_statements_re().is_match("SELECT * FROM bronze.orders"));
    }

    #[test]
    fn blocks_direct_file_access_functions() {
        assert!(blocked_functions_re().is_match("select * from read_parquet('s3://bucket/x.parquet')"));
        assert!(!blocked_functions_re().is_match("select * from bronze.orders"));
    }

    #[test]
    fn quotes_three_part_namespace_refs() {
        let sql = "select * from default.bronze.orders";
        assert_eq!(quote_ns_table_refs(sql), r#"select * from "default"."bronze"."orders""#);
    }

    #[test]
    fn strips_line_and_block_comments() {
        let sql = "-- a comment\nselect 1 /* inline */";
        assert_eq!(strip_sql_comments(sql), "select 1");
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        assert!(validate_identifier("orders; DROP TABLE x", "table name").is_err());
        assert!(validate_identifier("orders_2024", "table name").is_ok());
    }

    #[test]
    fn rejects_non_medallion_schema() {
        assert!(validate_schema("information_schema").is_err());
        assert!(validate_schema("bronze").is_ok());
    }
}
