//! Shared RPC-surface types for the runner and query services.
//!
//! Both `bins/rat-runner-server` and `bins/rat-query-server` expose their
//! operations over a small `axum` JSON API rather than hand-generating a
//! protobuf/tonic toolchain that can't be verified without a build step —
//! see `DESIGN.md`. This crate holds the wire-level request/response shapes
//! both share, the `Layer` enum + its string mapping, the error-sanitizing
//! pipeline applied before any error reaches a client, and the
//! `RunStatus` → wire-status mapping.

mod error;
mod layer;
mod query_types;
mod sanitize;
mod types;

pub use error::RpcError;
pub use layer::Layer;
pub use query_types::{
    ColumnMeta, ExecuteQueryRequest, ExecuteQueryResponse, GetSchemaRequest, GetSchemaResponse,
    ListTablesQuery, ListTablesResponse, PreviewTableRequest, PreviewTableResponse, TableInfo,
};
pub use sanitize::sanitize_error;
pub use types::{
    CancelRunResponse, GetRunStatusResponse, LogEntryWire, PreviewPipelineRequest,
    PreviewPipelineResponse, StreamLogsQuery, SubmitPipelineRequest, SubmitPipelineResponse,
    ValidatePipelineRequest, ValidatePipelineResponse, WireRunStatus,
};
