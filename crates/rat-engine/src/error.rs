use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query execution failed: {0}")]
    Execution(#[from] datafusion::error::DataFusionError),

    #[error("object store registration failed: {0}")]
    ObjectStore(String),

    #[error("query exceeded {0}s timeout")]
    Timeout(u64),

    #[error("query too long ({0} chars, max {1})")]
    QueryTooLong(usize, usize),

    #[error("only SELECT/WITH queries are allowed")]
    BlockedStatement,

    #[error("direct file/URL access functions are not allowed in queries")]
    BlockedFunction,

    #[error("invalid {0}: {1:?}")]
    InvalidIdentifier(&'static str, String),

    #[error("invalid schema {0:?} (allowed: bronze, silver, gold)")]
    InvalidSchema(String),
}
