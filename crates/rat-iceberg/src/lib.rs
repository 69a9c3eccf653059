//! Iceberg table writes: partition spec construction, the six merge
//! strategies, and watermark reads.
//!
//! Catalog access goes through the `iceberg` crate's `RestCatalog` scoped
//! to a single Nessie branch (`catalog::get_catalog`); table lifecycle and
//! data-file writes are isolated in `write`, with the single-column
//! delete+append fast path in `fast_path` and the full-rewrite merge SQL in
//! `fallback`.

mod catalog;
mod dedup;
mod error;
mod fallback;
mod fast_path;
mod identifiers;
mod partition;
mod strategies;
mod watermark;
mod write;

pub use catalog::{ensure_namespace, get_catalog, split_table_ident, table_ident};
pub use error::IcebergError;
pub use identifiers::{quote_identifier, validate_identifiers};
pub use partition::{build_partition_spec, PartitionFieldSpec};
pub use strategies::{
    append_iceberg, delete_insert_iceberg, merge_iceberg, scd2_iceberg, snapshot_iceberg, write_iceberg,
    write_with_strategy,
};
pub use watermark::read_watermark;
pub use write::{load_or_create_table, to_iceberg_schema};
