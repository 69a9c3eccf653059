//! The six merge strategies, dispatched from `write_with_strategy`. Each
//! strategy function takes `new_data_view` — a view already registered in
//! `engine`'s session holding the query-engine phase's output — and the
//! fully-qualified Iceberg table name (`namespace.layer.name`).

use datafusion::arrow::datatypes::Schema as ArrowSchema;
use iceberg_catalog_rest::RestCatalog;

use rat_core::{MergeStrategy, PartitionByEntry, PipelineConfig};
use rat_engine::PipelineEngine;

use crate::catalog::table_ident;
use crate::dedup::dedup_subquery;
use crate::error::IcebergError;
use crate::fallback::{merge_sql_delete_insert, merge_sql_incremental, merge_sql_scd2, merge_sql_snapshot, register_existing};
use crate::fast_path::try_optimized_delete_append;
use crate::partition::build_partition_spec;
use crate::write::{append_table, load_or_create_table, overwrite_table};

async fn new_data_schema(engine: &PipelineEngine, new_data_view: &str) -> Result<ArrowSchema, IcebergError> {
    let batches = engine.query_arrow(&format!("SELECT * FROM {new_data_view} LIMIT 0")).await?;
    Ok(batches
        .first()
        .map(|b| b.schema().as_ref().clone())
        .unwrap_or_else(ArrowSchema::empty))
}

async fn load_or_create(
    catalog: &RestCatalog,
    table_name: &str,
    schema: &ArrowSchema,
    partition_by: &[PartitionByEntry],
) -> Result<iceberg::table::Table, IcebergError> {
    let ident = table_ident(table_name)?;
    let partition_fields = build_partition_spec(schema, partition_by)?;
    load_or_create_table(catalog, &ident, schema, &partition_fields).await
}

/// `full_refresh`: unconditional overwrite. Idempotent by construction.
pub async fn write_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;
    let batches = engine.query_arrow(&format!("SELECT * FROM {new_data_view}")).await?;
    overwrite_table(catalog, table, batches).await?;
    Ok(())
}

/// `incremental`: idempotent on `unique_key`. Dedups `new_data` first, then
/// tries the single-column fast path before falling back to a full
/// ANTI-JOIN rewrite.
pub async fn merge_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    unique_key: &[String],
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;

    let new_data_sql = dedup_subquery(new_data_view, unique_key, &schema)?;

    if let Some(written) = try_optimized_delete_append(engine, catalog, table.clone(), &new_data_sql, unique_key).await? {
        return commit_merge_result(catalog, written).await;
    }

    register_existing(engine, &table).await?;
    let merge_sql = merge_sql_incremental(&new_data_sql, unique_key)?;
    let merged = engine.query_arrow(&merge_sql).await?;
    overwrite_table(catalog, table, merged).await?;
    Ok(())
}

/// `append_only`: no dedup, no merge SQL, no fast path. Retrying this
/// strategy duplicates rows by design — the caller owns exactly-once
/// delivery upstream if it matters.
pub async fn append_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;
    let batches = engine.query_arrow(&format!("SELECT * FROM {new_data_view}")).await?;
    append_table(catalog, table, batches).await?;
    Ok(())
}

/// `delete_insert`: same shape as `incremental` but `new_data` is never
/// deduplicated — a duplicate key in `new_data` is a caller bug.
pub async fn delete_insert_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    unique_key: &[String],
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;
    let new_data_sql = format!("SELECT * FROM {new_data_view}");

    if let Some(written) = try_optimized_delete_append(engine, catalog, table.clone(), &new_data_sql, unique_key).await? {
        return commit_merge_result(catalog, written).await;
    }

    register_existing(engine, &table).await?;
    let merge_sql = merge_sql_delete_insert(&new_data_sql, unique_key)?;
    let merged = engine.query_arrow(&merge_sql).await?;
    overwrite_table(catalog, table, merged).await?;
    Ok(())
}

/// `scd2`: always a full rewrite — there's no single-row fast path for a
/// strategy whose entire purpose is keeping history rows around.
#[allow(clippy::too_many_arguments)]
pub async fn scd2_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    unique_key: &[String],
    scd_valid_from: &str,
    scd_valid_to: &str,
    run_started_at: &str,
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;

    register_existing(engine, &table).await?;
    let new_data_sql = format!("SELECT * FROM {new_data_view}");
    let merge_sql = merge_sql_scd2(&new_data_sql, unique_key, scd_valid_from, scd_valid_to, run_started_at, &schema)?;
    let merged = engine.query_arrow(&merge_sql).await?;
    overwrite_table(catalog, table, merged).await?;
    Ok(())
}

/// `snapshot`: idempotent on `partition_column` — replaces only the
/// partitions present in `new_data`.
pub async fn snapshot_iceberg(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    partition_column: &str,
    partition_by: &[PartitionByEntry],
) -> Result<(), IcebergError> {
    let schema = new_data_schema(engine, new_data_view).await?;
    let table = load_or_create(catalog, table_name, &schema, partition_by).await?;
    let new_data_sql = format!("SELECT * FROM {new_data_view}");

    let partition_key = [partition_column.to_string()];
    if let Some(written) = try_optimized_delete_append(engine, catalog, table.clone(), &new_data_sql, &partition_key).await? {
        return commit_merge_result(catalog, written).await;
    }

    register_existing(engine, &table).await?;
    let merge_sql = merge_sql_snapshot(&new_data_sql, partition_column)?;
    let merged = engine.query_arrow(&merge_sql).await?;
    overwrite_table(catalog, table, merged).await?;
    Ok(())
}

async fn commit_merge_result(_catalog: &RestCatalog, _table: iceberg::table::Table) -> Result<(), IcebergError> {
    // try_optimized_delete_append already committed; nothing further to do.
    Ok(())
}

/// Phase 3 entry point: dispatch to the right strategy, downgrading to
/// `full_refresh` (with a warning, not an error) when the configured
/// strategy is missing a requirement it can't run without.
pub async fn write_with_strategy(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table_name: &str,
    new_data_view: &str,
    config: &PipelineConfig,
    run_started_at: &str,
) -> Result<(), IcebergError> {
    match config.merge_strategy {
        MergeStrategy::FullRefresh => {
            write_iceberg(engine, catalog, table_name, new_data_view, &config.partition_by).await
        }
        MergeStrategy::AppendOnly => {
            append_iceberg(engine, catalog, table_name, new_data_view, &config.partition_by).await
        }
        MergeStrategy::Incremental if !config.unique_key.is_empty() => {
            merge_iceberg(engine, catalog, table_name, new_data_view, &config.unique_key, &config.partition_by).await
        }
        MergeStrategy::DeleteInsert if !config.unique_key.is_empty() => {
            delete_insert_iceberg(engine, catalog, table_name, new_data_view, &config.unique_key, &config.partition_by).await
        }
        MergeStrategy::Scd2 if !config.unique_key.is_empty() => {
            scd2_iceberg(
                engine,
                catalog,
                table_name,
                new_data_view,
                &config.unique_key,
                &config.scd_valid_from,
                &config.scd_valid_to,
                run_started_at,
                &config.partition_by,
            )
            .await
        }
        MergeStrategy::Snapshot if !config.partition_column.is_empty() => {
            snapshot_iceberg(engine, catalog, table_name, new_data_view, &config.partition_column, &config.partition_by).await
        }
        MergeStrategy::Incremental | MergeStrategy::DeleteInsert | MergeStrategy::Scd2 => {
            tracing::warn!(
                table = table_name,
                strategy = %config.merge_strategy,
                "unique_key missing, downgrading to full_refresh"
            );
            write_iceberg(engine, catalog, table_name, new_data_view, &config.partition_by).await
        }
        MergeStrategy::Snapshot => {
            tracing::warn!(table = table_name, "partition_column missing, downgrading to full_refresh");
            write_iceberg(engine, catalog, table_name, new_data_view, &config.partition_by).await
        }
    }
}
