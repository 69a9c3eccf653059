use thiserror::Error;

/// Top-level executor error. Every phase collapses its failure into one of
/// these before the state machine records it on the run and moves to
/// cleanup — nothing below this layer is allowed to panic the worker task.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("run cancelled by user")]
    Cancelled,

    #[error("pipeline not found: neither {0} nor {1} exist")]
    PipelineNotFound(String, String),

    #[error("config error: {0}")]
    Config(#[from] rat_core::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] rat_store::StoreError),

    #[error("templating error: {0}")]
    Templating(#[from] rat_templating::TemplatingError),

    #[error("engine error: {0}")]
    Engine(#[from] rat_engine::EngineError),

    #[error("iceberg error: {0}")]
    Iceberg(#[from] rat_iceberg::IcebergError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] rat_sandbox::SandboxError),

    #[error("quality gate error: {0}")]
    Quality(#[from] rat_quality::QualityError),

    #[error("catalog error: {0}")]
    Catalog(#[from] rat_catalog::CatalogError),

    #[error("arrow error: {0}")]
    Arrow(#[from] datafusion::arrow::error::ArrowError),

    #[error("datafusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error("quality tests failed:\n{0}")]
    QualityGateFailed(String),

    #[error("branch merge failed: {0}")]
    BranchMergeFailed(String),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner at capacity: {active}/{max} concurrent runs")]
    AtCapacity { active: usize, max: usize },

    #[error("invalid layer: {0:?}")]
    InvalidLayer(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error(transparent)]
    Config(#[from] rat_core::ConfigError),

    #[error("marker io error: {0}")]
    Marker(#[from] std::io::Error),

    #[error("marker json error: {0}")]
    MarkerJson(#[from] serde_json::Error),
}
