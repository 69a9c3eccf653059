//! Low-level Iceberg table create/overwrite/append/delete, isolated behind
//! a small surface so the six merge strategies in `strategies.rs` never
//! touch the `iceberg` crate's transaction/writer API directly.

use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::Schema as ArrowSchema;
use iceberg::spec::{DataFile, NestedField, PrimitiveType, Schema as IcebergSchema, Type};
use iceberg::transaction::Transaction;
use iceberg::writer::base_writer::data_file_writer::DataFileWriterBuilder;
use iceberg::writer::file_writer::location_generator::{
    DefaultFileNameGenerator, DefaultLocationGenerator,
};
use iceberg::writer::file_writer::ParquetWriterBuilder;
use iceberg::writer::{IcebergWriter, IcebergWriterBuilder};
use iceberg::{Catalog, TableCreation, TableIdent};
use iceberg_catalog_rest::RestCatalog;

use crate::error::IcebergError;
use crate::partition::PartitionFieldSpec;

/// Convert a data Arrow schema into an Iceberg schema with 1-based field ids
/// that line up with `build_partition_spec`'s `source_id` numbering.
pub fn to_iceberg_schema(schema: &ArrowSchema) -> Result<IcebergSchema, IcebergError> {
    let fields: Result<Vec<_>, IcebergError> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let ty = arrow_to_iceberg_type(f.data_type())?;
            Ok(Arc::new(NestedField::new(
                (i + 1) as i32,
                f.name(),
                ty,
                !f.is_nullable(),
            )))
        })
        .collect();
    IcebergSchema::builder()
        .with_schema_id(0)
        .with_fields(fields?)
        .build()
        .map_err(|e| IcebergError::Table(e.to_string()))
}

fn arrow_to_iceberg_type(dt: &datafusion::arrow::datatypes::DataType) -> Result<Type, IcebergError> {
    use datafusion::arrow::datatypes::DataType as Dt;
    Ok(match dt {
        Dt::Boolean => Type::Primitive(PrimitiveType::Boolean),
        Dt::Int32 => Type::Primitive(PrimitiveType::Int),
        Dt::Int64 => Type::Primitive(PrimitiveType::Long),
        Dt::Float32 => Type::Primitive(PrimitiveType::Float),
        Dt::Float64 => Type::Primitive(PrimitiveType::Double),
        Dt::Utf8 | Dt::LargeUtf8 => Type::Primitive(PrimitiveType::String),
        Dt::Binary | Dt::LargeBinary => Type::Primitive(PrimitiveType::Binary),
        Dt::Date32 => Type::Primitive(PrimitiveType::Date),
        Dt::Timestamp(_, None) => Type::Primitive(PrimitiveType::Timestamp),
        Dt::Timestamp(_, Some(_)) => Type::Primitive(PrimitiveType::Timestamptz),
        other => return Err(IcebergError::Table(format!("unsupported arrow type {other:?}"))),
    })
}

/// Load a table, or create it (with the given partition spec, which may be
/// empty) if it doesn't exist yet.
pub async fn load_or_create_table(
    catalog: &RestCatalog,
    ident: &TableIdent,
    arrow_schema: &ArrowSchema,
    partition_fields: &[PartitionFieldSpec],
) -> Result<iceberg::table::Table, IcebergError> {
    if catalog
        .table_exists(ident)
        .await
        .map_err(|e| IcebergError::Catalog(e.to_string()))?
    {
        return catalog
            .load_table(ident)
            .await
            .map_err(|e| IcebergError::Catalog(e.to_string()));
    }

    let schema = to_iceberg_schema(arrow_schema)?;
    let mut spec_builder = iceberg::spec::PartitionSpec::builder(schema.clone()).with_spec_id(0);
    for field in partition_fields {
        let transform = match field.transform.as_str() {
            "identity" => iceberg::spec::Transform::Identity,
            "day" => iceberg::spec::Transform::Day,
            "month" => iceberg::spec::Transform::Month,
            "year" => iceberg::spec::Transform::Year,
            "hour" => iceberg::spec::Transform::Hour,
            other => return Err(IcebergError::UnsupportedTransform { column: field.name.clone(), transform: other.to_string() }),
        };
        spec_builder = spec_builder
            .add_partition_field(field.source_id, field.name.clone(), transform)
            .map_err(|e| IcebergError::Table(e.to_string()))?;
    }
    let partition_spec = spec_builder.build().map_err(|e| IcebergError::Table(e.to_string()))?;

    let creation = TableCreation::builder()
        .name(ident.name().to_string())
        .schema(schema)
        .partition_spec(partition_spec)
        .build();
    catalog
        .create_table(ident.namespace(), creation)
        .await
        .map_err(|e| IcebergError::Catalog(e.to_string()))
}

/// Write `batches` as one or more Parquet data files under the table's data
/// location and return their `DataFile` descriptors, uncommitted.
async fn write_data_files(
    table: &iceberg::table::Table,
    batches: Vec<RecordBatch>,
) -> Result<Vec<DataFile>, IcebergError> {
    if batches.is_empty() {
        return Ok(Vec::new());
    }
    let schema = table.metadata().current_schema().clone();
    let location_generator = DefaultLocationGenerator::new(table.metadata().clone())
        .map_err(|e| IcebergError::Table(e.to_string()))?;
    let file_name_generator =
        DefaultFileNameGenerator::new("data".to_string(), None, iceberg::spec::DataFileFormat::Parquet);
    let parquet_writer_builder = ParquetWriterBuilder::new(
        Default::default(),
        schema,
        table.file_io().clone(),
        location_generator,
        file_name_generator,
    );
    let writer_builder = DataFileWriterBuilder::new(parquet_writer_builder, None);
    let mut writer = writer_builder
        .build()
        .await
        .map_err(|e| IcebergError::Table(e.to_string()))?;
    for batch in batches {
        writer.write(batch).await.map_err(|e| IcebergError::Table(e.to_string()))?;
    }
    writer.close().await.map_err(|e| IcebergError::Table(e.to_string()))
}

/// Replace the table's entire contents with `batches` in one commit.
pub async fn overwrite_table(
    catalog: &RestCatalog,
    table: iceberg::table::Table,
    batches: Vec<RecordBatch>,
) -> Result<iceberg::table::Table, IcebergError> {
    let data_files = write_data_files(&table, batches).await?;
    let tx = Transaction::new(&table);
    let tx = tx
        .overwrite_files(None, data_files)
        .map_err(|e| IcebergError::Table(e.to_string()))?;
    tx.commit(catalog).await.map_err(|e| IcebergError::Catalog(e.to_string()))
}

/// Delete every row matching `predicate`, then append `batches`, as a
/// single atomic commit. Used by the single-column-key fast path: a
/// `col IN (...)` predicate scoped to exactly the rows the new data
/// replaces, leaving every other row untouched.
pub async fn delete_filter_then_append(
    catalog: &RestCatalog,
    table: iceberg::table::Table,
    predicate: iceberg::expr::Predicate,
    batches: Vec<RecordBatch>,
) -> Result<iceberg::table::Table, IcebergError> {
    let data_files = write_data_files(&table, batches).await?;
    let tx = Transaction::new(&table);
    let tx = tx
        .overwrite_files(Some(predicate), data_files)
        .map_err(|e| IcebergError::Table(e.to_string()))?;
    tx.commit(catalog).await.map_err(|e| IcebergError::Catalog(e.to_string()))
}

/// Append `batches` to the table without touching existing data files.
pub async fn append_table(
    catalog: &RestCatalog,
    table: iceberg::table::Table,
    batches: Vec<RecordBatch>,
) -> Result<iceberg::table::Table, IcebergError> {
    let data_files = write_data_files(&table, batches).await?;
    if data_files.is_empty() {
        return Ok(table);
    }
    let tx = Transaction::new(&table);
    let tx = tx
        .fast_append(None, data_files)
        .map_err(|e| IcebergError::Table(e.to_string()))?;
    tx.commit(catalog).await.map_err(|e| IcebergError::Catalog(e.to_string()))
}
