use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcebergError {
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("unsupported partition transform {transform:?} on column {column:?}")]
    UnsupportedTransform { column: String, transform: String },

    #[error("partition column {0:?} not found in table schema")]
    UnknownPartitionColumn(String),

    #[error("composite unique keys are not supported by the optimized delete+append path")]
    CompositeKeyUnsupported,

    #[error("merge_strategy {strategy} requires {requirement}")]
    MissingRequiredConfig { strategy: &'static str, requirement: &'static str },

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("query engine error: {0}")]
    Engine(#[from] rat_engine::EngineError),

    #[error("nessie error: {0}")]
    Nessie(#[from] rat_catalog::CatalogError),

    #[error("arrow error: {0}")]
    Arrow(#[from] datafusion::arrow::error::ArrowError),

    #[error("datafusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),
}
