//! Wire-level request/response payloads for the SubmitPipeline,
//! GetRunStatus, CancelRun, StreamLogs, and PreviewPipeline operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rat_core::RunStatus;

use crate::layer::Layer;

/// Wire-level run status. Unlike the original proto (which has no
/// `CANCELLED` value and collapses it into `FAILED`), this JSON surface
/// carries `Cancelled` as its own value — see `DESIGN.md`'s "Cancelled vs
/// Failed on the wire" resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl From<RunStatus> for WireRunStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Pending => WireRunStatus::Pending,
            RunStatus::Running => WireRunStatus::Running,
            RunStatus::Success => WireRunStatus::Success,
            RunStatus::Failed => WireRunStatus::Failed,
            RunStatus::Cancelled => WireRunStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPipelineRequest {
    pub namespace: String,
    pub layer: Layer,
    pub pipeline_name: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub s3_credentials: Option<HashMap<String, String>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub published_versions: Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitPipelineResponse {
    pub run_id: String,
    pub status: WireRunStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetRunStatusResponse {
    pub run_id: String,
    pub status: WireRunStatus,
    pub rows_written: u64,
    pub duration_ms: u64,
    pub error: String,
    pub archived_landing_zones: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelRunResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamLogsQuery {
    #[serde(default)]
    pub follow: bool,
    #[serde(default)]
    pub cursor: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntryWire {
    pub seq: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewPipelineRequest {
    pub namespace: String,
    pub layer: Layer,
    pub pipeline_name: String,
    #[serde(default)]
    pub preview_limit: Option<usize>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub pipeline_type_hint: Option<String>,
    #[serde(default)]
    pub s3_credentials: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewPipelineResponse {
    pub columns: Vec<String>,
    pub rows_sampled: usize,
    pub total_row_count: usize,
    pub explain_output: String,
    pub memory_peak_bytes: u64,
    pub error: String,
    pub warnings: Vec<String>,
}

/// `ValidatePipeline` — compiles a pipeline's template and checks it for
/// dependency cycles without executing anything. See `SPEC_FULL.md`'s
/// supplemented "ValidatePipeline RPC" feature.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatePipelineRequest {
    pub namespace: String,
    pub layer: Layer,
    pub pipeline_name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidatePipelineResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_stays_its_own_wire_value() {
        assert_eq!(WireRunStatus::from(RunStatus::Cancelled), WireRunStatus::Cancelled);
        assert_ne!(WireRunStatus::from(RunStatus::Cancelled), WireRunStatus::Failed);
    }

    #[test]
    fn submit_request_parses_minimal_json() {
        let json = r#"{"namespace":"acme","layer":"silver","pipeline_name":"orders"}"#;
        let req: SubmitPipelineRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.namespace, "acme");
        assert_eq!(req.layer, Layer::Silver);
        assert!(req.run_id.is_none());
    }
}
