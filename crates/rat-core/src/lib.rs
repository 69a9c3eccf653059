//! Domain types, configuration, and error taxonomy shared by the runner and
//! query services.
//!
//! This crate has no I/O of its own — every other `rat-*` crate depends on
//! it for the `Run`/`RunState` model, merge-strategy and partition types,
//! and the environment-driven config structs.

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod pipeline_config;
pub mod sql;

pub use config::{EngineConfig, NessieConfig, QueryConfig, RunnerConfig, S3Config};
pub use error::ConfigError;
pub use logger::{PipelineLogger, RunLogger};
pub use models::{
    CrashMarker, LogLevel, LogRecord, MergeStrategy, PartitionByEntry, PipelineConfig,
    QualityTestResult, RunState, RunStatus, VALID_PARTITION_TRANSFORMS,
};
pub use pipeline_config::{merge_configs, metadata_to_config, parse_pipeline_config, validate_pipeline_config};
pub use sql::escape_sql_string;
