//! Domain models shared by the runner's state machine, registry, and RPC layer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ConfigError;

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Severity/level of a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single log entry from a pipeline run.
///
/// `seq` is a monotonically increasing append sequence number, not a
/// positional index into the backing buffer — it stays valid as a streaming
/// cursor even after older entries are evicted from the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

const MAX_LOG_ENTRIES: usize = 10_000;

struct RunStateInner {
    status: RunStatus,
    rows_written: u64,
    duration_ms: u64,
    error: String,
    branch: String,
    env: HashMap<String, String>,
    quality_results: Vec<QualityTestResult>,
    archived_zones: Vec<String>,
    logs: VecDeque<LogRecord>,
}

/// Mutable state of a single pipeline run. Safe to share behind an `Arc` —
/// interior state is guarded by a short-held mutex, cancellation is a
/// set-once token, and log streaming uses a `Notify` so appends wake waiting
/// readers without busy-polling.
pub struct RunState {
    pub run_id: String,
    pub namespace: String,
    pub layer: String,
    pub pipeline_name: String,
    pub trigger: String,
    pub created_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    inner: Mutex<RunStateInner>,
    log_seq: AtomicU64,
    log_notify: Notify,
}

impl RunState {
    pub fn new(
        run_id: impl Into<String>,
        namespace: impl Into<String>,
        layer: impl Into<String>,
        pipeline_name: impl Into<String>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            namespace: namespace.into(),
            layer: layer.into(),
            pipeline_name: pipeline_name.into(),
            trigger: trigger.into(),
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            inner: Mutex::new(RunStateInner {
                status: RunStatus::Pending,
                rows_written: 0,
                duration_ms: 0,
                error: String::new(),
                branch: String::new(),
                env: HashMap::new(),
                quality_results: Vec::new(),
                archived_zones: Vec::new(),
                logs: VecDeque::new(),
            }),
            log_seq: AtomicU64::new(0),
            log_notify: Notify::new(),
        }
    }

    pub fn generate_run_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn status(&self) -> RunStatus {
        self.inner.lock().unwrap().status
    }

    pub fn set_status(&self, status: RunStatus) {
        self.inner.lock().unwrap().status = status;
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn set_branch(&self, branch: impl Into<String>) {
        self.inner.lock().unwrap().branch = branch.into();
    }

    pub fn branch(&self) -> String {
        self.inner.lock().unwrap().branch.clone()
    }

    pub fn set_error(&self, error: impl Into<String>) {
        self.inner.lock().unwrap().error = error.into();
    }

    pub fn error(&self) -> String {
        self.inner.lock().unwrap().error.clone()
    }

    pub fn set_rows_written(&self, rows: u64) {
        self.inner.lock().unwrap().rows_written = rows;
    }

    pub fn rows_written(&self) -> u64 {
        self.inner.lock().unwrap().rows_written
    }

    pub fn set_duration_ms(&self, duration_ms: u64) {
        self.inner.lock().unwrap().duration_ms = duration_ms;
    }

    pub fn duration_ms(&self) -> u64 {
        self.inner.lock().unwrap().duration_ms
    }

    pub fn set_quality_results(&self, results: Vec<QualityTestResult>) {
        self.inner.lock().unwrap().quality_results = results;
    }

    pub fn quality_results(&self) -> Vec<QualityTestResult> {
        self.inner.lock().unwrap().quality_results.clone()
    }

    pub fn set_archived_zones(&self, zones: Vec<String>) {
        self.inner.lock().unwrap().archived_zones = zones;
    }

    pub fn archived_zones(&self) -> Vec<String> {
        self.inner.lock().unwrap().archived_zones.clone()
    }

    /// Per-run credential/connection overrides (e.g. a caller-supplied STS
    /// token), applied to the process-wide `S3Config` at the start of
    /// execution via `S3Config::with_overrides`.
    pub fn set_env(&self, env: HashMap<String, String>) {
        self.inner.lock().unwrap().env = env;
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().env.clone()
    }

    /// Append a log record and wake any waiting `StreamLogs`-style readers.
    pub fn add_log(&self, level: LogLevel, message: impl Into<String>) {
        let seq = self.log_seq.fetch_add(1, Ordering::SeqCst);
        let record = LogRecord {
            seq,
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        {
            let mut inner = self.inner.lock().unwrap();
            inner.logs.push_back(record);
            if inner.logs.len() > MAX_LOG_ENTRIES {
                inner.logs.pop_front();
            }
        }
        self.log_notify.notify_waiters();
    }

    /// Return log records appended after `cursor` (exclusive).
    pub fn logs_from(&self, cursor: u64) -> Vec<LogRecord> {
        self.inner
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|r| r.seq > cursor)
            .cloned()
            .collect()
    }

    pub fn all_logs(&self) -> Vec<LogRecord> {
        self.inner.lock().unwrap().logs.iter().cloned().collect()
    }

    /// Block until new logs are available or `timeout` elapses.
    pub async fn wait_for_logs(&self, timeout: std::time::Duration) {
        let _ = tokio::time::timeout(timeout, self.log_notify.notified()).await;
    }
}

/// Supported merge strategies for pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    FullRefresh,
    Incremental,
    AppendOnly,
    DeleteInsert,
    Scd2,
    Snapshot,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::FullRefresh
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "full_refresh" => Ok(MergeStrategy::FullRefresh),
            "incremental" => Ok(MergeStrategy::Incremental),
            "append_only" => Ok(MergeStrategy::AppendOnly),
            "delete_insert" => Ok(MergeStrategy::DeleteInsert),
            "scd2" => Ok(MergeStrategy::Scd2),
            "snapshot" => Ok(MergeStrategy::Snapshot),
            other => Err(ConfigError::UnknownMergeStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeStrategy::FullRefresh => "full_refresh",
            MergeStrategy::Incremental => "incremental",
            MergeStrategy::AppendOnly => "append_only",
            MergeStrategy::DeleteInsert => "delete_insert",
            MergeStrategy::Scd2 => "scd2",
            MergeStrategy::Snapshot => "snapshot",
        };
        write!(f, "{s}")
    }
}

/// A single partition field: column name + Iceberg transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionByEntry {
    pub column: String,
    #[serde(default = "default_transform")]
    pub transform: String,
}

fn default_transform() -> String {
    "identity".to_string()
}

pub const VALID_PARTITION_TRANSFORMS: &[&str] = &["identity", "day", "month", "year", "hour"];

/// Parsed pipeline `config.yaml`, merged with source-level annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub description: String,
    pub materialized: String,
    pub unique_key: Vec<String>,
    pub merge_strategy: MergeStrategy,
    pub watermark_column: String,
    pub archive_landing_zones: bool,
    pub partition_column: String,
    pub partition_by: Vec<PartitionByEntry>,
    pub scd_valid_from: String,
    pub scd_valid_to: String,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            materialized: "table".to_string(),
            unique_key: Vec::new(),
            merge_strategy: MergeStrategy::FullRefresh,
            watermark_column: String::new(),
            archive_landing_zones: false,
            partition_column: String::new(),
            partition_by: Vec::new(),
            scd_valid_from: "valid_from".to_string(),
            scd_valid_to: "valid_to".to_string(),
            max_retries: 0,
            retry_delay_seconds: 30,
        }
    }
}

/// Result of a single quality test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTestResult {
    pub test_name: String,
    pub test_file: String,
    pub severity: String,
    pub status: String,
    pub row_count: u64,
    pub message: String,
    pub duration_ms: u64,
    pub description: String,
    pub compiled_sql: String,
    pub sample_rows: String,
    pub tags: Vec<String>,
    pub remediation: String,
}

/// A small durable record recovered from a marker file for a run that was
/// in-flight when the runner process crashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashMarker {
    pub run_id: String,
    pub namespace: String,
    pub layer: String,
    pub pipeline_name: String,
    pub trigger: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_is_terminal_matches_enum_variant() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn merge_strategy_round_trips_through_display_and_parse() {
        for s in [
            MergeStrategy::FullRefresh,
            MergeStrategy::Incremental,
            MergeStrategy::AppendOnly,
            MergeStrategy::DeleteInsert,
            MergeStrategy::Scd2,
            MergeStrategy::Snapshot,
        ] {
            let parsed: MergeStrategy = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn log_cursor_survives_eviction_past_the_cursor() {
        let run = RunState::new("r1", "ns", "silver", "orders", "manual");
        for i in 0..20 {
            run.add_log(LogLevel::Info, format!("line {i}"));
        }
        let cursor = run.logs_from(0).last().unwrap().seq;
        run.add_log(LogLevel::Info, "line 20");
        let fresh = run.logs_from(cursor);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "line 20");
    }

    #[test]
    fn log_ring_buffer_drops_oldest_past_capacity() {
        let run = RunState::new("r1", "ns", "silver", "orders", "manual");
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            run.add_log(LogLevel::Debug, format!("{i}"));
        }
        assert_eq!(run.all_logs().len(), MAX_LOG_ENTRIES);
        assert_eq!(run.all_logs().first().unwrap().message, "5");
    }
}
