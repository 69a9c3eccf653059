//! Optimized delete+append path for single-column unique keys.
//!
//! PyIceberg's row delete filter can express an exact `col IN (...)`
//! predicate but has no precise way to express the OR-of-ANDs a composite
//! key's delete filter needs, so the original skips straight to a full
//! rewrite whenever `unique_key` has more than one column. `iceberg-rust`'s
//! expression builder has the same limitation: a `Predicate` built from
//! `Reference::is_in` only covers a single column, so we keep the same
//! restriction rather than attempt an unsound approximation.

use datafusion::arrow::array::{Array, RecordBatch, StringArray};
use datafusion::arrow::datatypes::DataType;
use iceberg::expr::{Predicate, Reference};
use iceberg::spec::Datum;
use iceberg_catalog_rest::RestCatalog;

use rat_engine::PipelineEngine;

use crate::error::IcebergError;
use crate::identifiers::quote_identifier;
use crate::write::delete_filter_then_append;

/// Attempt the single-column delete+append fast path. Returns `Ok(None)`
/// when the unique key isn't a single column (caller should fall back to a
/// full rewrite), `Ok(Some(table))` on success. Any engine/catalog failure
/// also degrades to `Ok(None)` so the caller falls back rather than erroring
/// the whole run.
pub async fn try_optimized_delete_append(
    engine: &PipelineEngine,
    catalog: &RestCatalog,
    table: iceberg::table::Table,
    new_data_sql: &str,
    unique_key: &[String],
) -> Result<Option<iceberg::table::Table>, IcebergError> {
    let [key_col] = unique_key else {
        return Ok(None);
    };
    let quoted = match quote_identifier(key_col) {
        Ok(q) => q,
        Err(_) => return Ok(None),
    };

    let sql = format!("SELECT DISTINCT CAST({quoted} AS VARCHAR) AS key FROM ({new_data_sql}) n");
    let keys = match engine.query_arrow(&sql).await {
        Ok(batches) => collect_string_column(&batches, "key"),
        Err(_) => return Ok(None),
    };
    if keys.is_empty() {
        return Ok(None);
    }

    let new_batches = match engine.query_arrow(new_data_sql).await {
        Ok(b) => b,
        Err(_) => return Ok(None),
    };

    // The key's Arrow-side value came through as text regardless of its
    // underlying Iceberg type; try the numeric reading first since most
    // unique keys are surrogate integer ids, and only fall back to string
    // literals when any value doesn't parse as one.
    let all_numeric = keys.iter().all(|k| k.parse::<i64>().is_ok());
    let datums: Vec<Datum> = if all_numeric {
        keys.iter().map(|k| Datum::long(k.parse::<i64>().unwrap())).collect()
    } else {
        keys.iter().map(|k| Datum::string(k.clone())).collect()
    };

    let predicate: Predicate = Reference::new(key_col.as_str()).is_in(datums);

    match delete_filter_then_append(catalog, table, predicate, new_batches).await {
        Ok(t) => Ok(Some(t)),
        Err(_) => Ok(None),
    }
}

fn collect_string_column(batches: &[RecordBatch], name: &str) -> Vec<String> {
    let mut out = Vec::new();
    for batch in batches {
        let Ok(idx) = batch.schema().index_of(name) else { continue };
        let col = batch.column(idx);
        if col.data_type() != &DataType::Utf8 {
            continue;
        }
        if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
            for i in 0..arr.len() {
                if arr.is_valid(i) {
                    out.push(arr.value(i).to_string());
                }
            }
        }
    }
    out
}
