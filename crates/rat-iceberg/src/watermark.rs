//! Watermark column read: the high-water mark used to scope an
//! incremental pipeline's next source read.

use iceberg::{Catalog, TableIdent};
use iceberg_catalog_rest::RestCatalog;

use rat_engine::PipelineEngine;

use crate::error::IcebergError;
use crate::fallback::{register_existing, EXISTING_VIEW};
use crate::identifiers::quote_identifier;

/// `None` when the table doesn't exist yet, or exists but is empty.
/// Otherwise the watermark column's maximum value, stringified.
///
/// DataFusion's projection pushdown means selecting only `watermark_column`
/// here is enough to avoid a full-table scan — no separate "projected scan"
/// API is needed the way PyIceberg's `table.scan(selected_fields=...)`
/// makes explicit.
pub async fn read_watermark(
    catalog: &RestCatalog,
    engine: &PipelineEngine,
    ident: &TableIdent,
    watermark_column: &str,
) -> Result<Option<String>, IcebergError> {
    if !catalog
        .table_exists(ident)
        .await
        .map_err(|e| IcebergError::Catalog(e.to_string()))?
    {
        return Ok(None);
    }
    let table = catalog
        .load_table(ident)
        .await
        .map_err(|e| IcebergError::Catalog(e.to_string()))?;

    register_existing(engine, &table).await?;
    let col = quote_identifier(watermark_column)?;
    let sql = format!("SELECT CAST(MAX({col}) AS VARCHAR) AS watermark FROM {EXISTING_VIEW}");
    let batches = engine.query_arrow(&sql).await?;

    for batch in &batches {
        if batch.num_rows() == 0 {
            continue;
        }
        let arr = batch.column(0);
        if let Some(strings) = arr.as_any().downcast_ref::<datafusion::arrow::array::StringArray>() {
            if strings.is_valid(0) {
                return Ok(Some(strings.value(0).to_string()));
            }
        }
    }
    Ok(None)
}
