use thiserror::Error;

/// Errors raised while parsing or merging pipeline/server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required and must not be empty")]
    MissingEnv(&'static str),

    #[error("{0} must be a valid integer, got {1:?}")]
    InvalidInt(&'static str, String),

    #[error("{0} must be a positive integer, got {1}")]
    NotPositive(&'static str, i64),

    #[error("invalid config.yaml: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("unknown merge strategy: {0:?}")]
    UnknownMergeStrategy(String),

    #[error("unsupported partition transform {0:?} on column {1:?}")]
    UnsupportedTransform(String, String),

    #[error("both or neither of GRPC_TLS_CERT and GRPC_TLS_KEY must be set")]
    IncompleteTlsPair,
}
